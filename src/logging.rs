use log::info;

/// Initialize the logging system with an appropriate log level.
///
/// The level comes from the `CDAUDIO_EMU_LOG` environment variable and
/// defaults to `info`.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let log_level = std::env::var("CDAUDIO_EMU_LOG").unwrap_or_else(|_| "info".to_string());

    let mut builder = env_logger::Builder::new();

    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "{} [{}] [{}:{}] {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args()
        )
    });

    match log_level.to_lowercase().as_str() {
        "trace" => builder.filter_level(log::LevelFilter::Trace),
        "debug" => builder.filter_level(log::LevelFilter::Debug),
        "info" => builder.filter_level(log::LevelFilter::Info),
        "warn" => builder.filter_level(log::LevelFilter::Warn),
        "error" => builder.filter_level(log::LevelFilter::Error),
        _ => builder.filter_level(log::LevelFilter::Info),
    };

    builder.try_init()?;

    info!("CD-audio emulator logging initialized with level: {}", log_level);
    Ok(())
}
