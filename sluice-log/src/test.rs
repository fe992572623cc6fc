/// Initializes the logger for testing.
///
/// Not part of the public API. Use [`init_test!`](crate::init_test) instead.
#[doc(hidden)]
pub fn __init_test(module_path: &'static str) {
    let crate_name = module_path
        .split("::")
        .next()
        .expect("split returns at least one item");

    tracing_subscriber::fmt()
        .with_env_filter(format!("{crate_name}=trace"))
        .with_test_writer()
        .try_init()
        .ok();
}

/// Initialize the logger for testing.
///
/// This logs to the output capture registered by the Rust test runner, and
/// only captures logs from the calling crate.
///
/// # Example
///
/// ```
/// sluice_log::init_test!();
/// ```
#[macro_export]
macro_rules! init_test {
    () => {
        $crate::__init_test(::std::module_path!());
    };
}
