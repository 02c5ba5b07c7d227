use rollwriter::RotatingWriter;
use std::io::Write;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut logger = RotatingWriter::new("./logger.log", 3)?;

    writeln!(logger, "This is an info message")?;
    writeln!(logger, "This is a warning message")?;
    writeln!(logger, "This is an error message")?; // third write: logger.log is archived

    logger.close()?;
    Ok(())
}
