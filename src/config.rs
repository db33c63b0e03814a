//! 应用配置模块

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// 暂存区配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingConfig {
    /// 暂存区根目录，所有跨后端传输都经过这里
    #[serde(default = "default_staging_path")]
    pub path: String,
}

fn default_staging_path() -> String {
    "./storage".to_string()
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            path: default_staging_path(),
        }
    }
}

impl StagingConfig {
    /// 从配置文件加载暂存区配置
    pub fn load(config_dir: &Path) -> Self {
        let config_file = config_dir.join("config.json");
        if config_file.exists() {
            if let Ok(content) = fs::read_to_string(&config_file) {
                if let Ok(config) = serde_json::from_str::<serde_json::Value>(&content) {
                    if let Some(staging_config) = config.get("staging") {
                        if let Ok(staging) =
                            serde_json::from_value::<StagingConfig>(staging_config.clone())
                        {
                            return staging;
                        }
                    }
                }
            }
        }
        Self::default()
    }

    /// 保存暂存区配置
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        let config_file = config_dir.join("config.json");

        // 读取现有配置
        let mut config: serde_json::Value = if config_file.exists() {
            let content = fs::read_to_string(&config_file)?;
            serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        // 更新暂存区配置
        config["staging"] = serde_json::to_value(self).unwrap();

        // 写入文件
        let content = serde_json::to_string_pretty(&config).unwrap();
        fs::write(&config_file, content)?;

        Ok(())
    }
}
