//! 监控状态落盘
//! 每个tick结束后写入，重启时恢复持仓状态与台账

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::ExchangeError;

use super::pair::{AccountLedger, HedgePair};

/// 落盘的完整监控状态
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    pub pairs: HashMap<String, HedgePair>,
    pub ledger: AccountLedger,
    pub saved_at: Option<DateTime<Utc>>,
}

/// 状态存储
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// 加载已保存的状态；文件不存在时返回None，损坏时报错
    pub fn load(&self) -> Result<Option<PersistedState>, ExchangeError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| ExchangeError::ConfigError(format!("读取状态文件失败: {}", e)))?;
        let state: PersistedState = serde_json::from_str(&content)?;
        Ok(Some(state))
    }

    /// 保存状态（先写临时文件再原子替换）
    pub fn save(&self, state: &PersistedState) -> Result<(), ExchangeError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ExchangeError::ConfigError(format!("创建状态目录失败: {}", e)))?;
            }
        }

        let json = serde_json::to_string_pretty(state)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)
            .map_err(|e| ExchangeError::ConfigError(format!("写入状态文件失败: {}", e)))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| ExchangeError::ConfigError(format!("替换状态文件失败: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PositionSide;
    use crate::strategies::hedge::pair::{ClosedLeg, PairStatus};
    use crate::strategies::hedge::trailing::TrailingState;

    #[test]
    fn test_missing_file_returns_none() {
        let store = StateStore::new("/tmp/rusthedge_test_missing/nope.json");
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let dir = std::env::temp_dir().join("rusthedge_state_test");
        let path = dir.join("hedge_state.json");
        let _ = std::fs::remove_file(&path);

        let mut state = PersistedState::default();
        state.ledger.record_pair(-3.5);
        state.pairs.insert(
            "BTCUSDT".to_string(),
            HedgePair {
                symbol: "BTCUSDT".to_string(),
                status: PairStatus::OneStopped {
                    survivor: PositionSide::Long,
                    trailing: TrailingState {
                        tier: Some(2),
                        peak_pct: 1.4,
                    },
                    stopped: ClosedLeg {
                        side: PositionSide::Short,
                        entry_price: 100.0,
                        close_price: 101.2,
                        quantity: 2.0,
                        pnl_usdt: -2.4,
                        pnl_pct: -1.2,
                        is_profit: false,
                        closed_at: Utc::now(),
                    },
                },
                first_seen: Utc::now(),
            },
        );
        state.saved_at = Some(Utc::now());

        let store = StateStore::new(&path);
        store.save(&state).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert!((loaded.ledger.total() + 3.5).abs() < 1e-9);
        let pair = loaded.pairs.get("BTCUSDT").unwrap();
        match &pair.status {
            PairStatus::OneStopped { trailing, .. } => {
                assert_eq!(trailing.tier, Some(2));
            }
            other => panic!("状态恢复错误: {:?}", other),
        }

        let _ = std::fs::remove_file(&path);
    }
}
