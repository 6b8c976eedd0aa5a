//! Run the whole pipeline against the simulated sensor: a producer
//! thread pushes synthetic frames at 30 fps while the main thread polls
//! them off, then everything shuts down cleanly.
//!
//! ```sh
//! RUST_LOG=debug cargo run --example sim_preview
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use ocular::{config::CameraConfig, session::CaptureSession, sim::SimBackend};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let backend = SimBackend::new();
    let session = CaptureSession::new(backend.handle(), CameraConfig::default());
    session.parameters().set_brightness(55);
    session.parameters().set_analog_gain(2.0);
    session.start()?;

    let sensor = backend.sensor().ok_or("simulated sensor missing")?;
    let running = Arc::new(AtomicBool::new(true));
    let producer = {
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut shade = 0u8;
            while running.load(Ordering::SeqCst) {
                sensor.deliver(&vec![shade; 640 * 480 * 3 / 2]);
                shade = shade.wrapping_add(1);
                thread::sleep(Duration::from_millis(33));
            }
        })
    };

    let mut frames = session.accessor()?;
    for n in 0..30 {
        match frames.next(Duration::from_millis(500)) {
            Some(frame) => println!(
                "frame {n}: {} bytes, shade {}, t={}us",
                frame.payload().len(),
                frame.payload()[0],
                frame.timestamp_us()
            ),
            None => println!("frame {n}: timed out"),
        }
    }
    drop(frames);

    running.store(false, Ordering::SeqCst);
    producer.join().map_err(|_| "producer panicked")?;
    session.stop()?;
    println!("{:?}", session.metrics());
    Ok(())
}
