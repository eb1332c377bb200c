use pixpost::config::Config;

// Single test: env vars are process-global, so the failure and success
// cases run in sequence rather than racing in parallel test threads.
#[test]
fn config_from_env_requires_instance_and_token() {
    unsafe {
        std::env::remove_var("PIXELFED_INSTANCE_URL");
        std::env::remove_var("PIXELFED_ACCESS_TOKEN");
    }

    assert!(Config::from_env().is_err());

    unsafe {
        std::env::set_var("PIXELFED_INSTANCE_URL", "https://pixelfed.example/");
        std::env::set_var("PIXELFED_ACCESS_TOKEN", "test-token");
        std::env::set_var("WATCH_FOLDER", "/tmp/pixpost-test-watch");
    }

    let config = Config::from_env().unwrap();
    // Trailing slash is normalized away.
    assert_eq!(config.instance_url, "https://pixelfed.example");
    assert_eq!(
        config.queue_path(),
        std::path::Path::new("/tmp/pixpost-test-watch/.upload_queue.json")
    );
    assert!(!config.log_level.is_empty());

    // Interval vars must be non-negative integers.
    unsafe {
        std::env::set_var("POLL_INTERVAL_SECS", "soon");
    }
    assert!(Config::from_env().is_err());
    unsafe {
        std::env::remove_var("POLL_INTERVAL_SECS");
    }

    unsafe {
        std::env::set_var("QUEUE_FILE", "/tmp/elsewhere/queue.json");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(
        config.queue_path(),
        std::path::Path::new("/tmp/elsewhere/queue.json")
    );

    unsafe {
        std::env::remove_var("PIXELFED_INSTANCE_URL");
        std::env::remove_var("PIXELFED_ACCESS_TOKEN");
        std::env::remove_var("WATCH_FOLDER");
        std::env::remove_var("QUEUE_FILE");
    }
}
