use {
    rollwriter::RotatingWriterBuilder,
    std::{io::Write, time::Instant},
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let mut logger = RotatingWriterBuilder::new("./logs/restricted.log")
        .max_writes(100)
        .file_mode(0o640) // Set file permissions to: owner rw, group r, others none
        .create_dir(true)
        .build()?;

    // 1000 writes leave ten archives and an empty active file
    for i in 1..=1000 {
        let entry = format!("Log entry #{i}: This is a sample log message that will count towards rotation\n");
        logger.write_all(entry.as_bytes())?;
    }
    logger.close()?;
    println!("Done logging: {:?}", start.elapsed());
    Ok(())
}
