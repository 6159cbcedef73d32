//! Receive demo - print everything the remote streams back.
//!
//! # Running
//!
//! ```text
//! RUST_LOG=nrflink=debug cargo run --example receive -- /dev/ttyUSB1
//! ```

use nrflink::protocol::HexBytes;
use nrflink::{open_receiver, spawn_receiver, Received, ReceiverConfig, SerialConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .finish(),
    )?;

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| SerialConfig::default().path);

    let receiver = open_receiver(&SerialConfig::new(path), ReceiverConfig::default()).await?;
    let (mut payloads, handle) = spawn_receiver(receiver);

    while let Some(payload) = payloads.recv().await {
        match payload {
            Received::Bytes(bytes) => println!("{} bytes: {}", bytes.len(), HexBytes(&bytes)),
            Received::Text(text) => println!("text: {}", text),
            Received::Image(m) | Received::PackedImage(m) => {
                println!("image {}x{}", m.height(), m.width());
            }
        }
    }

    handle.await??;
    Ok(())
}
