use {
    rollwriter::RotatingWriter,
    std::{sync::Arc, thread},
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let writer = Arc::new(RotatingWriter::new("./shared.log", 50)?);

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let writer = Arc::clone(&writer);
            thread::spawn(move || -> Result<(), rollwriter::RotatingWriterError> {
                for i in 0..100 {
                    // One write call per line: the whole line counts once and is never split.
                    writer.write(format!("worker {worker} line {i}\n").as_bytes())?;
                }
                Ok(())
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker panicked")?;
    }
    println!("{} writes pending in {}", writer.write_count(), writer.path().display());
    Ok(())
}
