//! Send demo - push payloads through the radio bridge.
//!
//! This example demonstrates:
//! - Opening a link with the builder, or from a JSON config file
//! - Sending text, a test pattern and a 3-bit image
//! - Printing remote diagnostics as they arrive
//!
//! # Running
//!
//! ```text
//! RUST_LOG=nrflink=debug cargo run --example send -- /dev/ttyUSB0 text "hello"
//! cargo run --example send -- /dev/ttyUSB0 bytes 1000 --continuous
//! cargo run --example send -- /dev/ttyUSB0 image 600 800
//! cargo run --example send -- --config link.json text "hello"
//! ```

use nrflink::{Link, LinkBuilder, LinkConfig, PixelMatrix, RetryPolicy};

fn usage() -> ! {
    eprintln!(
        "usage: send (<port> | --config <file>) (text <s> | bytes <n> | image <h> <w>) [--continuous]"
    );
    std::process::exit(2)
}

/// Horizontal gradient, so every gray level shows up on the panel.
fn gradient(height: usize, width: usize) -> PixelMatrix {
    let mut matrix = PixelMatrix::new(height, width);
    for row in 0..height {
        for col in 0..width {
            matrix.set(row, col, (col * 255 / width.max(1)) as u8);
        }
    }
    matrix
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .finish(),
    )?;

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let continuous = match args.iter().position(|a| a == "--continuous") {
        Some(i) => {
            args.remove(i);
            true
        }
        None => false,
    };

    let mut args = args.into_iter();
    let mut builder = match args.next().as_deref() {
        Some("--config") => {
            let path = args.next().unwrap_or_else(|| usage());
            LinkBuilder::from_config(LinkConfig::load(path)?)
        }
        Some(port) => Link::builder(port),
        None => usage(),
    };
    if continuous {
        builder = builder.retry(RetryPolicy::continuous());
    }

    let mut link = builder.open().await?;

    if let Some(mut lines) = link.diagnostics() {
        tokio::spawn(async move {
            while let Some(line) = lines.recv().await {
                println!("remote: {}", line);
            }
        });
    }

    let report = match args.next().as_deref() {
        Some("text") => {
            let text = args.next().unwrap_or_else(|| usage());
            link.send_text(&text).await?
        }
        Some("bytes") => {
            let count: usize = args.next().unwrap_or_else(|| usage()).parse()?;
            link.send_test_bytes(count).await?
        }
        Some("image") => {
            let height: usize = args.next().unwrap_or_else(|| usage()).parse()?;
            let width: usize = args.next().unwrap_or_else(|| usage()).parse()?;
            link.send_image_3bit(&gradient(height, width)).await?
        }
        _ => usage(),
    };

    println!(
        "sent {} bytes in {} chunks, {:.0} B/s",
        report.bytes,
        report.chunks,
        report.bytes_per_second()
    );

    link.close().await?;
    Ok(())
}
