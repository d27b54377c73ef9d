use crate::core::error::ExchangeError;
/// 带抖动的指数退避重试
use std::time::Duration;
use tokio::time::sleep;

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 最大重试次数
    pub max_retries: u32,
    /// 初始延迟（毫秒）
    pub initial_delay_ms: u64,
    /// 最大延迟（毫秒）
    pub max_delay_ms: u64,
    /// 指数退避因子
    pub backoff_factor: f64,
    /// 是否添加抖动
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 200,
            max_delay_ms: 10000,
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

/// 指数退避重试执行器
pub struct ExponentialBackoffRetry {
    config: RetryConfig,
}

impl ExponentialBackoffRetry {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// 判断是否应该重试
    pub fn should_retry(&self, error: &ExchangeError, attempt: u32) -> bool {
        if attempt >= self.config.max_retries {
            return false;
        }
        error.is_retryable()
    }

    /// 计算重试延迟
    pub fn calculate_delay(&self, error: &ExchangeError, attempt: u32) -> Duration {
        // 交易所明确给出等待时间时优先遵守
        if let Some(seconds) = error.retry_after() {
            let hinted_ms = seconds * 1000;
            if hinted_ms > self.config.initial_delay_ms {
                return Duration::from_millis(hinted_ms.min(self.config.max_delay_ms));
            }
        }

        let base_delay =
            self.config.initial_delay_ms as f64 * self.config.backoff_factor.powi(attempt as i32);
        let mut delay_ms = base_delay.min(self.config.max_delay_ms as f64) as u64;

        if self.config.jitter && delay_ms > 0 {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            let jitter = rng.gen_range(0..=delay_ms / 4);
            delay_ms += jitter;
        }

        Duration::from_millis(delay_ms)
    }

    /// 执行带重试的操作
    pub async fn execute<F, T, Fut>(&self, operation: F) -> Result<T, ExchangeError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: std::future::Future<Output = Result<T, ExchangeError>> + Send,
        T: Send,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        log::info!("✅ 操作在第{}次尝试后成功", attempt + 1);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !self.should_retry(&error, attempt) {
                        return Err(error);
                    }

                    let delay = self.calculate_delay(&error, attempt);
                    log::warn!(
                        "⚠️ 操作失败，将在{:.2}秒后重试 (尝试 {}/{}): {}",
                        delay.as_secs_f64(),
                        attempt + 1,
                        self.config.max_retries,
                        error
                    );

                    attempt += 1;
                    sleep(delay).await;
                }
            }
        }
    }
}

/// 重试助手函数
pub async fn retry_async<F, T, Fut>(operation: F, max_retries: u32) -> Result<T, ExchangeError>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<T, ExchangeError>> + Send,
    T: Send,
{
    let policy = ExponentialBackoffRetry::new(RetryConfig {
        max_retries,
        ..Default::default()
    });
    policy.execute(operation).await
}
