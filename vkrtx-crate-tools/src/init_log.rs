use std::io::Write;

/// 初始化全局 logger
///
/// 默认等级为 Info，可以通过 `RUST_LOG` 覆盖，例如 `RUST_LOG=vkrtx_frame=trace`
pub fn init_log() {
    init_log_with_level(log::LevelFilter::Info);
}

pub fn init_log_with_level(default_level: log::LevelFilter) {
    let result = env_logger::Builder::new()
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
                level => buf.default_level_style(level).fg_color(Some(anstyle::AnsiColor::Cyan.into())),
            };
            let grey_style = anstyle::Style::new().fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));
            let text_style = anstyle::Style::new().fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(75, 75, 75))));

            let line = record.line().unwrap_or(!0);
            let file = short_file_name(record.file().unwrap_or(""));
            let time = chrono::Local::now().format("%H:%M:%S%.3f");
            let level = record.level();

            writeln!(
                buf,
                "{level_style}[{time}] {level:<5}{level_style:#} {grey_style}[{file}:{line}]{grey_style:#} \
                 {text_style}{}{text_style:#}",
                record.args()
            )
        })
        .filter(None, default_level)
        // RUST_LOG 优先于默认等级
        .parse_default_env()
        .try_init();

    if let Err(e) = result {
        log::warn!("logger already initialized: {e}");
    }
}

/// 只保留文件名，windows 与 unix 的分隔符都要处理
fn short_file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_file_name() {
        assert_eq!(short_file_name("engine/crates/vkrtx-gfx/src/lib.rs"), "lib.rs");
        assert_eq!(short_file_name(r"engine\crates\vkrtx-gfx\src\lib.rs"), "lib.rs");
        assert_eq!(short_file_name("main.rs"), "main.rs");
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init_log();
        init_log_with_level(log::LevelFilter::Trace);
    }
}
