use std::{net::IpAddr, sync::Arc};
use core::time::Duration;
use coeaxis::{
    Axis, AxisContext,
    DictionaryEntry, ObjectDictionary, SdoValue,
    NodeLocatorCache, NodePorts, StaticLocator,
    };

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let address: IpAddr = std::env::args().nth(1)
        .unwrap_or_else(|| "192.168.1.10".into())
        .parse()?;

    let dictionary = ObjectDictionary::from(vec![
        // csp
        DictionaryEntry::new(0x6060, 0, SdoValue::Int32(8)),
        // following error window
        DictionaryEntry::new(0x6065, 0, SdoValue::Int32(10_000)),
        ]);
    let context = AxisContext::new(
        NodeLocatorCache::new(StaticLocator(vec![NodePorts::new(address, 5000, 5001)])),
        Arc::new(dictionary),
        );

    let axis = Axis::new(address, "csp", &context).await?;
    let initial = axis.get_pdo_in().actual_position;
    println!("operation enabled at position {}", initial);

    // slow sine around the initial position
    let mut period = tokio::time::interval(Duration::from_millis(10));
    for step in 0 .. 1000 {
        period.tick().await;
        let offset = (10_000. * (step as f32 * 0.01).sin()) as i32;
        axis.set_position(initial.wrapping_add(offset))?;
        if step % 100 == 0 {
            let input = axis.get_pdo_in();
            println!("position {}  error {:#06x}  {}", input.actual_position, input.error_code, input.status_word);
        }
    }
    axis.close();
    Ok(())
}
