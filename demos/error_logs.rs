use rollwriter::{RotatingWriterBuilder, RotatingWriterError};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // One error report per write, so max_writes bounds the reports per file.
    let error_logger = RotatingWriterBuilder::new("./logs/error.log")
        .max_writes(2)
        .create_dir(true)
        .archive_existing(false) // Keep appending across restarts
        .build()?;

    for error_code in &[500, 502, 503, 504] {
        let report = format!(
            "Error {error_code}: Server encountered an internal error\n  at processRequest (server.rs:42)\n  at main (main.rs:15)\n"
        );
        match error_logger.write(report.as_bytes()) {
            Ok(_) => {}
            Err(RotatingWriterError::RotateAfterWrite { written, source }) => {
                eprintln!("report saved ({written} bytes) but rotation failed: {source}");
            }
            Err(err) => return Err(err.into()),
        }
    }
    error_logger.flush()?;

    if let Some(err) = error_logger.take_close_error() {
        eprintln!("a rotated file was not closed cleanly: {err}");
    }
    Ok(())
}
