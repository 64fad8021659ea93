mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dicomark_bridge::{AnnotationBridge, AnnotationSync, Readiness};
use dicomark_core::annotation::{Annotation, ImageReference, ToolType};
use dicomark_engine::{BusViewport, EngineEventBus};

use common::*;

const IMAGE: &str = "wadouri:http://pacs/ct-001.dcm";

fn bridge() -> AnnotationBridge<FakeAnnotationEngine> {
    let sync = AnnotationSync::new(Arc::new(FakeAnnotationEngine::default()), shared_annotations());
    AnnotationBridge::new(Arc::new(sync))
}

fn viewport(element_id: &str) -> (Arc<EngineEventBus>, Arc<BusViewport>) {
    let bus = Arc::new(EngineEventBus::default());
    let viewport = Arc::new(BusViewport::new(element_id, Arc::clone(&bus)));
    (bus, viewport)
}

/// Wait until the store holds `expected` annotations.
async fn wait_for_len(bridge: &AnnotationBridge<FakeAnnotationEngine>, expected: usize) -> bool {
    for _ in 0..100 {
        if bridge.sync().store().read().await.len() == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn starts_loading_and_not_listening() {
    let bridge = bridge();
    assert_eq!(bridge.readiness().await, Readiness::Loading);
    assert!(!bridge.is_listening().await);
}

#[tokio::test]
async fn mount_before_tools_waits_for_load() {
    let bridge = bridge();
    let (bus, viewport) = viewport("viewport-1");

    assert!(!bridge.mount(viewport).await);
    assert_eq!(bus.receiver_count(), 0);

    assert_eq!(bridge.load_tools(&FakeToolsLoader::ok()).await, Readiness::Ready);
    assert!(bridge.is_listening().await);
    assert_eq!(bridge.listening_element().await.as_deref(), Some("viewport-1"));
    assert_eq!(bus.receiver_count(), 1);
}

#[tokio::test]
async fn events_flow_into_store_once_attached() {
    let bridge = bridge();
    let (bus, viewport) = viewport("viewport-1");
    bridge.load_tools(&FakeToolsLoader::ok()).await;
    assert!(bridge.mount(viewport).await);

    bus.publish(added(engine_annotation("ext-1", "Length", "1.2.3.4", IMAGE)));
    bus.publish(added(engine_annotation("ext-2", "Angle", "1.2.3.4", IMAGE)));
    assert!(wait_for_len(&bridge, 2).await);

    bus.publish(removed(engine_annotation("ext-1", "Length", "1.2.3.4", IMAGE)));
    assert!(wait_for_len(&bridge, 1).await);
}

#[tokio::test]
async fn attaching_recreates_annotations_missing_from_engine() {
    let bridge = bridge();
    let (_bus, viewport) = viewport("viewport-1");
    let imported = Annotation::new(ToolType::Length, ImageReference::default());
    let id = imported.id.clone();
    bridge.sync().store().write().await.add_annotation(imported);

    bridge.load_tools(&FakeToolsLoader::ok()).await;
    assert!(bridge.mount(viewport).await);

    for _ in 0..100 {
        if bridge.sync().external_id_for(&id).is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let uid = bridge.sync().external_id_for(&id).unwrap();
    assert!(bridge.sync().engine().has(&uid));
    assert_eq!(bridge.sync().engine().known_count(), 1);
}

#[tokio::test]
async fn failed_load_disables_bridge() {
    let bridge = bridge();
    let (bus, viewport) = viewport("viewport-1");

    let readiness = bridge
        .load_tools(&FakeToolsLoader::failing("module missing"))
        .await;
    assert!(matches!(readiness, Readiness::Failed(ref reason) if reason.contains("module missing")));

    assert!(!bridge.mount(viewport).await);
    assert_eq!(bus.receiver_count(), 0);
}

#[tokio::test]
async fn loading_twice_after_success_is_noop() {
    let bridge = bridge();
    let loader = FakeToolsLoader::ok();
    bridge.load_tools(&loader).await;
    bridge.load_tools(&loader).await;
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unmount_stops_listener() {
    let bridge = bridge();
    let (bus, viewport) = viewport("viewport-1");
    bridge.load_tools(&FakeToolsLoader::ok()).await;
    bridge.mount(viewport).await;

    bridge.unmount().await;
    assert!(!bridge.is_listening().await);
    assert_eq!(bus.receiver_count(), 0);

    bus.publish(added(engine_annotation("ext-1", "Length", "1.2.3.4", IMAGE)));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(bridge.sync().store().read().await.is_empty());
}

#[tokio::test]
async fn remount_switches_viewport() {
    let bridge = bridge();
    let (first_bus, first) = viewport("viewport-1");
    let (second_bus, second) = viewport("viewport-2");
    bridge.load_tools(&FakeToolsLoader::ok()).await;

    bridge.mount(first).await;
    bridge.mount(second).await;
    assert_eq!(bridge.listening_element().await.as_deref(), Some("viewport-2"));
    assert_eq!(first_bus.receiver_count(), 0);
    assert_eq!(second_bus.receiver_count(), 1);
}

#[tokio::test]
async fn shutdown_prevents_reattach() {
    let bridge = bridge();
    let (_bus, viewport) = viewport("viewport-1");
    bridge.load_tools(&FakeToolsLoader::ok()).await;
    bridge.shutdown().await;

    assert!(!bridge.mount(viewport).await);
}
