//! 移动止盈档位表

use serde::{Deserialize, Serialize};

use crate::core::error::ExchangeError;

/// 回撤规则
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Drawback {
    /// 固定回撤：从最高盈利扣除固定百分点
    Fixed(f64),
    /// 比例回撤：从最高盈利扣除 比例 × 最高盈利
    Proportional(f64),
}

impl Drawback {
    /// 按当前最高盈利计算回撤量（百分点）
    pub fn amount(&self, peak_pct: f64) -> f64 {
        match self {
            Drawback::Fixed(points) => *points,
            Drawback::Proportional(fraction) => fraction * peak_pct,
        }
    }
}

/// 单个止盈档位
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    /// 进入该档位所需的最高盈利（%）
    pub threshold_pct: f64,
    /// 回撤规则
    pub drawback: Drawback,
}

/// 档位表：阈值严格递增的有序序列，加载后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrailingTierTable {
    tiers: Vec<Tier>,
}

impl TrailingTierTable {
    pub fn new(tiers: Vec<Tier>) -> Result<Self, ExchangeError> {
        if tiers.is_empty() {
            return Err(ExchangeError::ConfigError(
                "移动止盈档位表不能为空".to_string(),
            ));
        }

        for (i, tier) in tiers.iter().enumerate() {
            if tier.threshold_pct <= 0.0 {
                return Err(ExchangeError::ConfigError(format!(
                    "档位{}阈值必须为正数: {}",
                    i + 1,
                    tier.threshold_pct
                )));
            }
            if i > 0 && tier.threshold_pct <= tiers[i - 1].threshold_pct {
                return Err(ExchangeError::ConfigError(format!(
                    "档位阈值必须严格递增: 第{}档 {} <= 第{}档 {}",
                    i + 1,
                    tier.threshold_pct,
                    i,
                    tiers[i - 1].threshold_pct
                )));
            }
            match tier.drawback {
                Drawback::Fixed(points) if points <= 0.0 => {
                    return Err(ExchangeError::ConfigError(format!(
                        "档位{}固定回撤必须为正数: {}",
                        i + 1,
                        points
                    )));
                }
                Drawback::Proportional(fraction) if fraction <= 0.0 || fraction >= 1.0 => {
                    return Err(ExchangeError::ConfigError(format!(
                        "档位{}比例回撤必须在(0, 1)之间: {}",
                        i + 1,
                        fraction
                    )));
                }
                _ => {}
            }
        }

        Ok(Self { tiers })
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Tier> {
        self.tiers.get(index)
    }

    /// 最高盈利已达到的最高档位下标；未达到任何档位时返回None
    pub fn select(&self, peak_pct: f64) -> Option<usize> {
        self.tiers
            .iter()
            .rposition(|tier| tier.threshold_pct <= peak_pct)
    }

    /// 指定档位在当前最高盈利下的止盈触发线
    pub fn stop_level(&self, tier_index: usize, peak_pct: f64) -> f64 {
        let tier = &self.tiers[tier_index];
        peak_pct - tier.drawback.amount(peak_pct)
    }
}

impl Default for TrailingTierTable {
    /// 默认11档阶梯
    fn default() -> Self {
        let tiers = vec![
            Tier {
                threshold_pct: 0.7,
                drawback: Drawback::Proportional(0.20),
            },
            Tier {
                threshold_pct: 1.0,
                drawback: Drawback::Fixed(0.3),
            },
            Tier {
                threshold_pct: 1.3,
                drawback: Drawback::Fixed(0.3),
            },
            Tier {
                threshold_pct: 1.5,
                drawback: Drawback::Fixed(0.3),
            },
            Tier {
                threshold_pct: 2.0,
                drawback: Drawback::Proportional(0.30),
            },
            Tier {
                threshold_pct: 2.5,
                drawback: Drawback::Proportional(0.30),
            },
            Tier {
                threshold_pct: 3.0,
                drawback: Drawback::Proportional(0.25),
            },
            Tier {
                threshold_pct: 4.0,
                drawback: Drawback::Proportional(0.25),
            },
            Tier {
                threshold_pct: 5.0,
                drawback: Drawback::Proportional(0.20),
            },
            Tier {
                threshold_pct: 7.5,
                drawback: Drawback::Proportional(0.20),
            },
            Tier {
                threshold_pct: 10.0,
                drawback: Drawback::Proportional(0.20),
            },
        ];

        Self { tiers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_has_eleven_increasing_tiers() {
        let table = TrailingTierTable::default();
        assert_eq!(table.len(), 11);
        for i in 1..table.len() {
            assert!(table.get(i).unwrap().threshold_pct > table.get(i - 1).unwrap().threshold_pct);
        }
    }

    #[test]
    fn test_select_highest_qualifying_tier() {
        let table = TrailingTierTable::default();
        assert_eq!(table.select(0.5), None);
        assert_eq!(table.select(0.7), Some(0));
        assert_eq!(table.select(0.9), Some(0));
        assert_eq!(table.select(1.0), Some(1));
        assert_eq!(table.select(4.5), Some(7));
        assert_eq!(table.select(42.0), Some(10));
    }

    #[test]
    fn test_stop_level_fixed_and_proportional() {
        let table = TrailingTierTable::default();
        // 第1档：比例回撤20%，peak 0.9 → 0.72
        assert!((table.stop_level(0, 0.9) - 0.72).abs() < 1e-9);
        // 第2档：固定回撤0.3，peak 1.2 → 0.9
        assert!((table.stop_level(1, 1.2) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_validation_rejects_inverted_thresholds() {
        let tiers = vec![
            Tier {
                threshold_pct: 1.0,
                drawback: Drawback::Fixed(0.3),
            },
            Tier {
                threshold_pct: 0.7,
                drawback: Drawback::Fixed(0.2),
            },
        ];
        assert!(TrailingTierTable::new(tiers).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_drawbacks() {
        let tiers = vec![Tier {
            threshold_pct: 1.0,
            drawback: Drawback::Proportional(1.5),
        }];
        assert!(TrailingTierTable::new(tiers).is_err());

        let tiers = vec![Tier {
            threshold_pct: 1.0,
            drawback: Drawback::Fixed(0.0),
        }];
        assert!(TrailingTierTable::new(tiers).is_err());

        assert!(TrailingTierTable::new(Vec::new()).is_err());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let yaml = r#"
- threshold_pct: 0.7
  drawback: { type: proportional, value: 0.2 }
- threshold_pct: 1.0
  drawback: { type: fixed, value: 0.3 }
"#;
        let table: TrailingTierTable = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).unwrap().drawback, Drawback::Proportional(0.2));
        assert_eq!(table.get(1).unwrap().drawback, Drawback::Fixed(0.3));
    }
}
