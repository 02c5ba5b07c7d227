use {
    rollwriter::RotatingWriterBuilder,
    std::sync::Arc,
    tracing_subscriber::util::SubscriberInitExt,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let appender = RotatingWriterBuilder::new("./logs/tracing.log")
        .max_writes(2)
        .create_dir(true)
        .build()?;

    // Shared directly: Arc<RotatingWriter> is a MakeWriter, one event per write.
    let appender = Arc::new(appender);
    let _guard = tracing_subscriber::fmt()
        .with_writer(Arc::clone(&appender))
        .with_ansi(false)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .finish()
        .set_default();

    tracing::info!("This is an info message");
    tracing::warn!("This is a warning message");
    tracing::error!("This is an error message");
    drop(_guard);

    // Or moved onto a background thread with tracing_appender.
    let appender = RotatingWriterBuilder::new("./logs/tracing-nb.log")
        .max_writes(2)
        .create_dir(true)
        .build()?;
    let (non_blocking, _worker) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .finish()
        .try_init()?;

    tracing::info!("Written from the background worker");
    Ok(())
}
