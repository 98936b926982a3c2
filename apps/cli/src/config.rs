//! CLI 配置
//!
//! 配置文件：`<config_dir>/raisin/config.toml`（`--config` 可覆盖）。
//! 文件不存在时使用默认配置；命令行参数最后覆盖文件中的值。

use anyhow::{Context, Result};
use raisin_sdk::ClientConfig;
use std::path::{Path, PathBuf};

/// 配置目录
pub fn config_dir() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("raisin");
    Ok(path)
}

/// 默认配置文件路径
pub fn default_config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// REPL 历史记录文件（目录不可用时写在当前目录）
pub fn history_file() -> PathBuf {
    config_dir()
        .map(|dir| dir.join("history"))
        .unwrap_or_else(|_| PathBuf::from(".raisin_history"))
}

/// 加载配置
///
/// 显式指定的文件必须存在；默认位置的文件缺失时返回默认配置。
pub fn load(explicit: Option<&Path>) -> Result<ClientConfig> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => (default_config_file()?, false),
    };

    if !path.exists() {
        if required {
            anyhow::bail!("配置文件不存在: {}", path.display());
        }
        return Ok(ClientConfig::default());
    }

    ClientConfig::load(&path).with_context(|| format!("读取配置文件失败: {}", path.display()))
}

/// 输出生效的配置（TOML）
pub fn render(config: &ClientConfig) -> Result<String> {
    let network = toml::to_string_pretty(&config.network).context("序列化网络配置失败")?;
    Ok(format!(
        "service_timeout_secs = {:?}\nconnect_timeout_secs = {:?}\n\n[network]\n{}",
        config.service_timeout_secs, config.connect_timeout_secs, network
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_explicit_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[network]\ninterfaces = [\"lo\"]").unwrap();
        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.network.interfaces, vec!["lo"]);
    }

    #[test]
    fn test_render_round_trips() {
        let config = ClientConfig::default();
        let text = render(&config).unwrap();
        assert_eq!(ClientConfig::from_toml_str(&text).unwrap(), config);
    }
}
