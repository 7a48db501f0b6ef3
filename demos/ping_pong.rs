//! # Ping-pong Example
//!
//! Two subscribers bounce a counter back and forth over the bus while `main`
//! waits for the final pong with a filtered, time-limited wait.
//!
//! ## Run
//! ```bash
//! RUST_LOG=msgbus=debug cargo run --example ping_pong
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use msgbus::{Bus, BusError, HandlerPanic, WaitOptions};
use tracing_subscriber::EnvFilter;

const ROUNDS: u32 = 5;

#[derive(Debug)]
struct Ping(u32);

#[derive(Debug)]
struct Pong(u32);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), BusError> {
    init_tracing();

    let bus = Arc::new(
        Bus::builder()
            .with_thread_name("ping-pong")
            .with_workers(2)
            .with_panic_hook(|report: &HandlerPanic| {
                tracing::error!(
                    message_type = report.message_type,
                    subscription = %report.subscription,
                    reason = %report.reason,
                    "handler panicked"
                );
            })
            .build()?,
    );

    // Handlers hold a weak reference so the bus can still be dropped.
    let weak: Weak<Bus> = Arc::downgrade(&bus);
    bus.subscribe(move |ping: &Ping| {
        println!(" ├─► ping {}", ping.0);
        if let Some(bus) = weak.upgrade() {
            let _ = bus.publish(Pong(ping.0));
        }
    })?;

    let weak: Weak<Bus> = Arc::downgrade(&bus);
    bus.subscribe(move |pong: &Pong| {
        println!(" ├─► pong {}", pong.0);
        if pong.0 < ROUNDS {
            if let Some(bus) = weak.upgrade() {
                let _ = bus.publish(Ping(pong.0 + 1));
            }
        }
    })?;

    let last = bus.wait_for_message(
        WaitOptions::<Pong>::new()
            .filter(|pong| pong.0 == ROUNDS)
            .timeout(Duration::from_secs(2)),
    )?;

    println!("Rally:");
    bus.publish(Ping(1))?;

    let pong = last.await?;
    println!(" └─► done after {} rounds", pong.0);

    bus.dispose();
    Ok(())
}
