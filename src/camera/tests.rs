use super::*;
use crate::config::CameraConfig;
use crate::error::{PhotoboothError, ResourceError};
use std::time::Duration;

fn create_test_settings() -> CameraSettings {
    CameraSettings {
        preview_box: Resolution::new(640, 480),
        preview_max_width: 640,
        buffer_count: 2,
        hflip_preview: true,
        stabilization_delay: Duration::ZERO,
    }
}

fn create_test_manager() -> (CameraResourceManager, MockCameraHandle) {
    let driver = MockCameraDriver::new(Resolution::new(1640, 1232));
    let handle = driver.handle();
    let manager = CameraResourceManager::new(Box::new(driver), create_test_settings());
    (manager, handle)
}

#[test]
fn test_initialize_enters_preview_mode() {
    let (mut camera, handle) = create_test_manager();
    assert_eq!(camera.state(), SessionState::Uninitialized);

    camera.initialize().unwrap();

    assert_eq!(camera.state(), SessionState::PreviewMode);
    assert!(handle.is_running());
    assert_eq!(handle.configure_calls(), 1);
    assert_eq!(
        camera.session().applied,
        Some(AppliedConfig {
            mode: CaptureMode::Preview,
            size: Resolution::new(1640, 1232),
        })
    );
    assert_eq!(
        camera.still_profile().map(|p| p.resolution),
        Some(Resolution::new(1640, 1232))
    );

    // Already running, nothing else happens
    camera.initialize().unwrap();
    assert_eq!(handle.configure_calls(), 1);
    assert_eq!(handle.start_calls(), 1);
}

#[test]
fn test_capture_before_initialize_fails() {
    let (mut camera, _handle) = create_test_manager();
    let result = camera.capture(true, None, None);
    assert!(matches!(
        result,
        Err(PhotoboothError::Resource(ResourceError::NotInitialized))
    ));
}

#[test]
fn test_repeated_identical_captures_reconfigure_once() {
    let (mut camera, handle) = create_test_manager();
    camera.initialize().unwrap();
    let after_init = handle.configure_calls();

    for _ in 0..5 {
        let frame = camera.capture(false, Some(820), Some(616)).unwrap();
        assert_eq!(frame.dimensions(), (820, 616));
    }

    assert_eq!(handle.configure_calls(), after_init + 1);
    assert_eq!(camera.stats().reconfigurations, 1);
    assert_eq!(camera.stats().cheap_captures, 4);
    assert_eq!(camera.state(), SessionState::StillMode);
}

#[test]
fn test_alternating_modes_reconfigure_every_time() {
    let (mut camera, handle) = create_test_manager();
    camera.initialize().unwrap();
    let after_init = handle.configure_calls();

    camera.capture(false, Some(820), Some(616)).unwrap();
    camera.capture(true, Some(820), Some(616)).unwrap();
    camera.capture(false, Some(820), Some(616)).unwrap();
    camera.capture(false, Some(410), Some(308)).unwrap();

    assert_eq!(handle.configure_calls(), after_init + 4);
    assert_eq!(camera.stats().cheap_captures, 0);
}

#[test]
fn test_width_change_alone_reconfigures_once() {
    let (mut camera, handle) = create_test_manager();
    camera.initialize().unwrap();

    camera.capture(false, Some(820), Some(616)).unwrap();
    let before = handle.configure_calls();

    let frame = camera.capture(false, Some(410), Some(616)).unwrap();
    assert_eq!(frame.dimensions(), (410, 616));
    assert_eq!(handle.configure_calls(), before + 1);

    camera.capture(false, Some(410), Some(616)).unwrap();
    assert_eq!(handle.configure_calls(), before + 1);
}

#[test]
fn test_height_change_alone_reconfigures_once() {
    let (mut camera, handle) = create_test_manager();
    camera.initialize().unwrap();

    camera.capture(false, Some(820), Some(616)).unwrap();
    let before = handle.configure_calls();

    let frame = camera.capture(false, Some(820), Some(308)).unwrap();
    assert_eq!(frame.dimensions(), (820, 308));
    assert_eq!(handle.configure_calls(), before + 1);

    camera.capture(false, Some(820), Some(308)).unwrap();
    assert_eq!(handle.configure_calls(), before + 1);
}

#[test]
fn test_degenerate_size_rejected_without_reconfiguring() {
    let (mut camera, handle) = create_test_manager();
    camera.initialize().unwrap();
    let before = handle.configure_calls();
    let applied = camera.session().applied;

    let result = camera.capture(false, Some(1), Some(3));

    assert!(matches!(
        result,
        Err(PhotoboothError::Resource(ResourceError::InvalidSize { .. }))
    ));
    assert_eq!(handle.configure_calls(), before);
    assert_eq!(camera.state(), SessionState::PreviewMode);
    assert_eq!(camera.session().applied, applied);

    // Still usable afterwards
    assert!(camera.capture(false, Some(820), Some(616)).is_ok());
}

#[test]
fn test_preview_without_size_after_initialize_is_cheap() {
    let (mut camera, handle) = create_test_manager();
    camera.initialize().unwrap();

    let frame = camera.capture(true, None, None).unwrap();

    assert_eq!(handle.configure_calls(), 1);
    assert_eq!(camera.stats().cheap_captures, 1);
    // Served by the preview profile, not the sensor size
    assert_eq!(
        frame.dimensions(),
        (
            camera.preview_profile().unwrap().resolution.width,
            camera.preview_profile().unwrap().resolution.height
        )
    );
}

#[test]
fn test_odd_sizes_rounded_down_before_reaching_driver() {
    let (mut camera, handle) = create_test_manager();
    camera.initialize().unwrap();

    let frame = camera.capture(false, Some(1093), Some(821)).unwrap();

    assert_eq!(frame.dimensions(), (1092, 820));
    let applied = handle.applied_profile().unwrap();
    assert_eq!(applied.resolution, Resolution::new(1092, 820));
    assert_eq!(applied.mode, CaptureMode::Still);

    // 1093x821 and 1092x820 are the same request once rounded
    camera.capture(false, Some(1092), Some(820)).unwrap();
    assert_eq!(camera.stats().reconfigurations, 1);
}

#[test]
fn test_unset_size_defaults_to_sensor() {
    let (mut camera, _handle) = create_test_manager();
    camera.initialize().unwrap();

    let frame = camera.capture(false, None, None).unwrap();
    assert_eq!(frame.dimensions(), (1640, 1232));

    // Only one dimension is the same as none
    let frame = camera.capture(false, Some(100), None).unwrap();
    assert_eq!(frame.dimensions(), (1640, 1232));
    assert_eq!(camera.stats().reconfigurations, 1);
}

#[test]
fn test_preview_frames_are_mirrored() {
    let (mut camera, _handle) = create_test_manager();
    camera.initialize().unwrap();

    let preview = camera.capture(true, Some(200), Some(100)).unwrap();
    assert_eq!(*preview.get_pixel(199, 0), MOCK_MARKER);

    let still = camera.capture(false, Some(200), Some(100)).unwrap();
    assert_eq!(*still.get_pixel(0, 0), MOCK_MARKER);
    assert_ne!(*still.get_pixel(199, 0), MOCK_MARKER);
}

#[test]
fn test_stop_is_idempotent() {
    let (mut camera, handle) = create_test_manager();
    camera.initialize().unwrap();

    camera.stop().unwrap();
    assert_eq!(camera.state(), SessionState::Stopped);
    assert!(!handle.is_running());

    camera.stop().unwrap();
    assert_eq!(handle.stop_calls(), 1);
}

#[test]
fn test_capture_after_stop_restarts_in_preview() {
    let (mut camera, handle) = create_test_manager();
    camera.initialize().unwrap();
    camera.capture(false, Some(820), Some(616)).unwrap();
    camera.stop().unwrap();

    let frame = camera.capture(true, None, None).unwrap();

    assert!(handle.is_running());
    assert_eq!(camera.stats().restarts, 1);
    assert_eq!(camera.state(), SessionState::PreviewMode);
    assert_eq!(handle.start_calls(), 2);
    assert_eq!(
        frame.dimensions().0,
        camera.preview_profile().unwrap().resolution.width
    );
}

#[test]
fn test_open_failure_marks_session_failed() {
    let (mut camera, handle) = create_test_manager();
    handle.fail_open(true);

    assert!(camera.initialize().is_err());
    assert_eq!(camera.state(), SessionState::Failed);
    assert!(matches!(
        camera.capture(true, None, None),
        Err(PhotoboothError::Resource(ResourceError::Failed))
    ));

    // Recovery requires an explicit re-initialize
    handle.fail_open(false);
    camera.initialize().unwrap();
    assert_eq!(camera.state(), SessionState::PreviewMode);
    assert!(camera.capture(true, None, None).is_ok());
}

#[test]
fn test_start_failure_marks_session_failed() {
    let (mut camera, handle) = create_test_manager();
    handle.fail_start(true);

    assert!(camera.initialize().is_err());
    assert_eq!(camera.state(), SessionState::Failed);
    assert!(camera.session().applied.is_none());
}

#[test]
fn test_reconfigure_failure_marks_session_failed() {
    let (mut camera, handle) = create_test_manager();
    camera.initialize().unwrap();
    handle.fail_configure(true);

    let result = camera.capture(false, Some(820), Some(616));

    assert!(matches!(
        result,
        Err(PhotoboothError::Resource(ResourceError::Configuration { .. }))
    ));
    assert_eq!(camera.state(), SessionState::Failed);

    // Stopping a failed camera still releases the device
    camera.stop().unwrap();
    assert_eq!(handle.stop_calls(), 1);
    assert_eq!(camera.state(), SessionState::Failed);
}

#[test]
fn test_frame_failure_keeps_session_usable() {
    let (mut camera, handle) = create_test_manager();
    camera.initialize().unwrap();
    handle.fail_frame(1);

    assert!(matches!(
        camera.capture(false, Some(820), Some(616)),
        Err(PhotoboothError::Capture(_))
    ));
    assert_eq!(camera.state(), SessionState::StillMode);
    assert!(camera.capture(false, Some(820), Some(616)).is_ok());
}

#[test]
fn test_needs_reconfigure() {
    let still = AppliedConfig {
        mode: CaptureMode::Still,
        size: Resolution::new(820, 616),
    };
    let preview = AppliedConfig {
        mode: CaptureMode::Preview,
        size: Resolution::new(820, 616),
    };

    assert!(needs_reconfigure(None, still));
    assert!(!needs_reconfigure(Some(still), still));
    assert!(needs_reconfigure(Some(preview), still));
}

#[test]
fn test_builder_requires_config() {
    let result = CameraResourceManagerBuilder::new().build();
    assert!(matches!(result, Err(PhotoboothError::System { .. })));
}

#[test]
fn test_builder_with_mock_driver() {
    let config = CameraConfig {
        driver: "mock".to_string(),
        source: "libcamerasrc".to_string(),
        sensor_resolution: (640, 480),
        preview_box: (320, 300),
        preview_max_width: 320,
        stabilization_delay_ms: 0,
        buffer_count: 2,
        hflip_preview: false,
    };

    let mut camera = CameraResourceManagerBuilder::new()
        .config(config)
        .build()
        .unwrap();
    camera.initialize().unwrap();

    assert_eq!(
        camera.preview_profile().map(|p| p.resolution),
        Some(Resolution::new(320, 240))
    );
}

#[test]
fn test_unknown_driver_rejected() {
    let mut config = crate::config::PhotoboothConfig::default().camera;
    config.driver = "webcam".to_string();

    assert!(matches!(
        build_driver(&config),
        Err(PhotoboothError::Resource(
            ResourceError::DriverUnavailable { .. }
        ))
    ));
}
