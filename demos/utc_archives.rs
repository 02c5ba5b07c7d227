use {
    rollwriter::{RotatingWriterBuilder, TimeZone},
    std::io::Write,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut logger = RotatingWriterBuilder::new("./logs/utc.log")
        .max_writes(2)
        .time_zone(TimeZone::UTC) // Archives named like 2025-04-01T11:55:02Z-utc.log
        .create_dir(true)
        .build()?;

    writeln!(logger, "System startup - UTC timestamp will be used for archives")?;
    writeln!(logger, "Configuration loaded successfully")?;
    writeln!(logger, "Server listening on port 8080")?;

    if let Some(archive) = logger.rotate()? {
        println!("archived to {}", archive.display());
    }
    Ok(())
}
