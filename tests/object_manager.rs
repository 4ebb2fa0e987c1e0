//! End-to-end behaviour of the object manager with tokio timers and a channel sink.

use anyhow::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::StreamExt;
use uavtalk::{
    ChannelSink, ChecksumPolicy, FieldType, Frame, FrameDecoder, FrameType, ManagerConfig, Metadata, ObjectManager,
    RawFieldDefinition, RawObjectDefinition, TokioScheduler, UpdateMode, Value,
};

const BATTERY_ID: u32 = 0x2784_BE4C;

fn battery() -> RawObjectDefinition {
    RawObjectDefinition {
        name: "FlightBatteryState".into(),
        object_id: BATTERY_ID,
        fields: vec![
            RawFieldDefinition::new("Voltage", FieldType::Float32, 1),
            RawFieldDefinition::new("Current", FieldType::Float32, 1),
            RawFieldDefinition::new("ConsumedEnergy", FieldType::UInt32, 1),
            RawFieldDefinition::new("CellVoltages", FieldType::UInt16, 4),
        ],
    }
}

fn battery_payload(voltage: f32) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&voltage.to_le_bytes());
    payload.extend_from_slice(&2.5f32.to_le_bytes());
    payload.extend_from_slice(&1200u32.to_le_bytes());
    for cell in [4100u16, 4090, 4110, 4080] {
        payload.extend_from_slice(&cell.to_le_bytes());
    }
    payload
}

fn setup(config: ManagerConfig) -> Result<(ObjectManager, UnboundedReceiver<Bytes>)> {
    let _ = tracing_subscriber::fmt::try_init();
    let (sink, wire) = ChannelSink::new();
    let scheduler = TokioScheduler::try_current().ok_or_else(|| anyhow::anyhow!("no tokio runtime"))?;
    let manager = ObjectManager::new(config, Arc::new(sink), Arc::new(scheduler));
    let errors = manager.load(vec![battery()], || {});
    anyhow::ensure!(errors.is_empty(), "load failed: {errors:?}");
    Ok((manager, wire))
}

fn drain(wire: &mut UnboundedReceiver<Bytes>) -> Vec<Frame> {
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    while let Ok(bytes) = wire.try_recv() {
        frames.extend(decoder.push(&bytes));
    }
    frames
}

#[tokio::test(start_paused = true)]
async fn request_correlation_with_retries() -> Result<()> {
    let (manager, mut wire) = setup(ManagerConfig::default())?;
    let order = Arc::new(Mutex::new(Vec::new()));

    for caller in 0..3 {
        let order = Arc::clone(&order);
        let outcome = manager.get_object(
            "FlightBatteryState",
            move |instance| order.lock().push((caller, instance.get("Voltage"))),
            false,
        )?;
        assert!(outcome.is_pending());
    }

    let sent = drain(&mut wire);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].frame_type, FrameType::ObjReq);
    assert_eq!(sent[0].object_id, BATTERY_ID);

    // Two retry periods without an answer
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(drain(&mut wire).len(), 2);

    manager.feed(&Frame::encode(FrameType::Obj, BATTERY_ID, 0, &battery_payload(12.6))?);
    let voltage = Some(Value::Float32(12.6));
    assert_eq!(*order.lock(), [(0, voltage), (1, voltage), (2, voltage)]);

    // Resolved: the timer is gone and the cache answers synchronously
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(drain(&mut wire).is_empty());

    let outcome = manager.get_object(BATTERY_ID, |_| {}, false)?;
    let cached = outcome.cached().ok_or_else(|| anyhow::anyhow!("expected a cached instance"))?;
    assert_eq!(cached.field("CellVoltages").map(<[Value]>::len), Some(4));
    assert_eq!(cached.get("CellVoltages[3]"), Some(Value::UInt16(4080)));
    assert!(drain(&mut wire).is_empty());

    let stats = manager.stats();
    assert_eq!(stats.requests_sent, 3);
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.objects_received, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancelled_request_goes_quiet() -> Result<()> {
    let (manager, mut wire) = setup(ManagerConfig::default().with_retry_interval(Duration::from_millis(250)))?;

    let outcome = manager.get_object(BATTERY_ID, |_| panic!("cancelled callback ran"), false)?;
    let uavtalk::GetObject::Pending(handle) = outcome else {
        anyhow::bail!("nothing should be cached yet");
    };

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(drain(&mut wire).len(), 3);

    assert!(handle.cancel());
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(drain(&mut wire).is_empty());

    manager.feed(&Frame::encode(FrameType::Obj, BATTERY_ID, 0, &battery_payload(11.1))?);
    assert!(manager.get_cached_instance(BATTERY_ID).is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn fetch_and_subscribe() -> Result<()> {
    let (manager, mut wire) = setup(ManagerConfig::default())?;
    let mut updates = Box::pin(manager.subscribe());

    let fetcher = manager.clone();
    let fetch = tokio::spawn(async move { fetcher.fetch("FlightBatteryState", false).await });
    while manager.pending_requests(BATTERY_ID) == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(drain(&mut wire).len(), 1);

    manager.feed(&Frame::encode(FrameType::Obj, BATTERY_ID, 0, &battery_payload(12.0))?);
    let fetched = fetch.await??;
    let streamed = updates.next().await.ok_or_else(|| anyhow::anyhow!("update stream ended"))?;
    assert!(Arc::ptr_eq(&fetched, &streamed));
    assert_eq!(fetched.get("ConsumedEnergy"), Some(Value::UInt32(1200)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn metadata_objects_round_trip() -> Result<()> {
    let (manager, mut wire) = setup(ManagerConfig::default())?;
    let metadata_definition =
        manager.definition("FlightBatteryState.Metadata").ok_or_else(|| anyhow::anyhow!("no metadata"))?;
    assert_eq!(metadata_definition.object_id(), BATTERY_ID + 1);

    // periodic telemetry, acked, GCS read-only
    let flags: u16 = 0b01_0110;
    let mut payload = flags.to_le_bytes().to_vec();
    for period in [1000u16, 0, 5000] {
        payload.extend_from_slice(&period.to_le_bytes());
    }
    manager.feed(&Frame::encode(FrameType::Obj, BATTERY_ID + 1, 0, &payload)?);

    let instance =
        manager.get_cached_instance(BATTERY_ID + 1).ok_or_else(|| anyhow::anyhow!("metadata not cached"))?;
    let mut metadata = Metadata::from_instance(&instance)?;
    assert!(metadata.flags.telemetry_acked());
    assert_eq!(metadata.flags.telemetry_update_mode(), UpdateMode::Periodic);
    assert_eq!(metadata.telemetry_update_period, 1000);
    assert_eq!(metadata.logging_update_period, 5000);

    metadata.flags.set_logging_update_mode(UpdateMode::OnChange);
    manager.update_object(&metadata.to_instance(&metadata_definition)?)?;

    let sent = drain(&mut wire);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].object_id, BATTERY_ID + 1);
    assert_eq!(u16::from_le_bytes([sent[0].payload[0], sent[0].payload[1]]), flags | (2 << 8));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn checksum_policy_is_configurable() -> Result<()> {
    let mut corrupted = Frame::encode(FrameType::Obj, BATTERY_ID, 0, &battery_payload(10.0))?.to_vec();
    let last = corrupted.len() - 1;
    corrupted[last] = corrupted[last].wrapping_add(1);

    let (strict, _wire) = setup(ManagerConfig::default())?;
    strict.feed(&corrupted);
    assert!(strict.get_cached_instance(BATTERY_ID).is_none());
    assert_eq!(strict.decoder_stats().checksum_errors, 1);

    let (permissive, _wire) = setup(ManagerConfig::default().with_checksum_policy(ChecksumPolicy::Permissive))?;
    permissive.feed(&corrupted);
    assert!(permissive.get_cached_instance(BATTERY_ID).is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn chunked_input_with_line_noise() -> Result<()> {
    let (manager, _wire) = setup(ManagerConfig::default())?;
    let mut stream = vec![0x00, 0xFF, 0x12];
    stream.extend_from_slice(&Frame::encode(FrameType::Obj, BATTERY_ID, 0, &battery_payload(9.5))?);
    stream.extend_from_slice(&[0xAA, 0x55]);
    stream.extend_from_slice(&Frame::encode(FrameType::Obj, BATTERY_ID, 0, &battery_payload(9.4))?);

    for chunk in stream.chunks(3) {
        manager.feed(chunk);
    }

    let cached = manager.get_cached_instance(BATTERY_ID).ok_or_else(|| anyhow::anyhow!("not cached"))?;
    assert_eq!(cached.get("Voltage"), Some(Value::Float32(9.4)));
    assert_eq!(manager.stats().objects_received, 2);
    assert_eq!(manager.decoder_stats().missed_sync, 5);
    Ok(())
}
