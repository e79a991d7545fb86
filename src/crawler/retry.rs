use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tracing::{info, warn};

use crate::site::SiteError;

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Backoff {
    /// 每次等待相同时间
    Fixed { secs: u64 },
    /// 第 n 次失败后等待 `n * step_secs`
    Linear { step_secs: u64 },
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, secs: u64) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { secs },
        }
    }

    pub fn linear(max_attempts: u32, step_secs: u64) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Linear { step_secs },
        }
    }

    /// 第 `attempt` 次 (从 0 开始) 失败后的等待时间
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed { secs } => Duration::from_secs(secs),
            Backoff::Linear { step_secs } => {
                Duration::from_secs(step_secs.saturating_mul(u64::from(attempt) + 1))
            }
        }
    }

    /// 执行 `op` 直到成功或次数用尽
    ///
    /// `op` 返回 `Ok(None)` 表示本次没拿到结果, 与 `Err` 一样会重试;
    /// 付费墙这类重试无意义的错误直接返回. 只在两次尝试之间等待.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let max_attempts = self.max_attempts.max(1);
        for attempt in 0..max_attempts {
            info!("第 {}/{} 次尝试: {}", attempt + 1, max_attempts, label);
            match op(attempt).await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => warn!("第 {} 次尝试未获取到内容: {}", attempt + 1, label),
                Err(e) if !SiteError::is_retryable(&e) => return Err(e),
                Err(e) => warn!("第 {} 次尝试出错: {}: {:#}", attempt + 1, label, e),
            }

            if attempt + 1 < max_attempts {
                tokio::time::sleep(self.delay(attempt)).await;
            }
        }
        Err(SiteError::RetriesExhausted {
            attempts: max_attempts,
            target: label.to_owned(),
        }
        .into())
    }
}
