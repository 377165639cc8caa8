// dbvault/src/backup/compression.rs
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

/// Gzip-compresses `source` into `destination`.
///
/// Returns the number of uncompressed bytes read.
pub fn gzip_file(source: &Path, destination: &Path) -> io::Result<u64> {
    let mut input = BufReader::new(File::open(source)?);
    let output = BufWriter::new(File::create(destination)?);
    let mut encoder = GzEncoder::new(output, Compression::default());

    let copied = io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(copied)
}

/// Inflates the gzip file at `source` into `destination`.
///
/// Returns the number of decompressed bytes written.
pub fn gunzip_file(source: &Path, destination: &Path) -> io::Result<u64> {
    // Creating the destination would truncate the input mid-read.
    if source == destination {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cannot decompress {} onto itself", source.display()),
        ));
    }
    let mut decoder = GzDecoder::new(BufReader::new(File::open(source)?));
    let mut output = BufWriter::new(File::create(destination)?);

    let written = io::copy(&mut decoder, &mut output)?;
    output.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_then_gunzip_restores_contents() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let plain = dir.path().join("dump.sql");
        let packed = dir.path().join("dump.sql.gz");
        let unpacked = dir.path().join("restored.sql");
        let sql = "CREATE TABLE t (id int);\nINSERT INTO t VALUES (1);\n".repeat(200);
        std::fs::write(&plain, &sql)?;

        let read = gzip_file(&plain, &packed)?;
        assert_eq!(read, sql.len() as u64);
        assert!(std::fs::metadata(&packed)?.len() < sql.len() as u64);

        gunzip_file(&packed, &unpacked)?;
        assert_eq!(std::fs::read_to_string(&unpacked)?, sql);
        Ok(())
    }

    #[test]
    fn test_gunzip_rejects_plain_input() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let bogus = dir.path().join("not-gzip.sql.gz");
        std::fs::write(&bogus, "plain text")?;

        let result = gunzip_file(&bogus, &dir.path().join("out.sql"));
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_gunzip_refuses_to_overwrite_its_input() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let plain = dir.path().join("dump.sql");
        let packed = dir.path().join("orders_latest");
        std::fs::write(&plain, "SELECT 1;\n")?;
        gzip_file(&plain, &packed)?;
        let before = std::fs::read(&packed)?;

        let err = gunzip_file(&packed, &packed).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(std::fs::read(&packed)?, before);
        Ok(())
    }
}
