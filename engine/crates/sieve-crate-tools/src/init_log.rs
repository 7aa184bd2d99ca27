use std::io::Write;

/// 构建带颜色的 logger
///
/// 默认级别为 Info，可以通过 `RUST_LOG` 覆盖。
fn build_logger(is_test: bool) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let level_style = match record.level() {
                log::Level::Error => {
                    buf.default_level_style(log::Level::Error).fg_color(Some(anstyle::AnsiColor::Red.into()))
                }
                log::Level::Warn => {
                    buf.default_level_style(log::Level::Warn).fg_color(Some(anstyle::AnsiColor::Yellow.into()))
                }
                log::Level::Info => {
                    buf.default_level_style(log::Level::Info).fg_color(Some(anstyle::AnsiColor::Green.into()))
                }
                level => buf.default_level_style(level),
            };
            let dim_style = anstyle::Style::new().fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

            let time = chrono::Local::now().format("%H:%M:%S%.3f");
            let target = record.target().rsplit("::").next().unwrap_or("");
            let line = record.line().unwrap_or(0);

            writeln!(
                buf,
                "{level_style}[{time}] {:<5}{level_style:#} {dim_style}[{target}:{line}]{dim_style:#} {}",
                record.level(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .parse_default_env()
        .is_test(is_test);
    builder
}

/// 初始化全局 logger，只能调用一次
pub fn init_log() {
    build_logger(false).init();
}

/// 测试用的 logger 初始化，可以重复调用
pub fn init_test_log() {
    let _ = build_logger(true).try_init();
}
