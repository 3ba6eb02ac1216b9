use log::LevelFilter;

pub fn init(level: LevelFilter) {
    env_logger::Builder::new().format_timestamp_millis().filter(None, level).init();
}
