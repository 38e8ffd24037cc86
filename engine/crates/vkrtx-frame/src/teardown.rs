use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TeardownError {
    #[error("`{resource}` destroyed while the device may still be using it")]
    DestroyBeforeIdle { resource: String },
}

/// teardown 序列中的一步
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownStep {
    Submit,
    WaitIdle,
    Destroy(String),
}

/// 追踪 device 是否 idle，在销毁资源前检查
///
/// 新建时没有任何提交，视为 idle；每次提交之后必须再次 wait idle 才能销毁资源
#[derive(Debug, Clone)]
pub struct TeardownTracker {
    idle: bool,
}
impl Default for TeardownTracker {
    fn default() -> Self {
        Self::new()
    }
}
impl TeardownTracker {
    #[inline]
    pub fn new() -> Self {
        Self { idle: true }
    }

    #[inline]
    pub fn note_submit(&mut self) {
        self.idle = false;
    }

    #[inline]
    pub fn note_idle(&mut self) {
        self.idle = true;
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn check_destroy(&self, resource: &str) -> Result<(), TeardownError> {
        if self.idle {
            Ok(())
        } else {
            Err(TeardownError::DestroyBeforeIdle {
                resource: resource.to_string(),
            })
        }
    }

    pub fn apply(&mut self, step: &TeardownStep) -> Result<(), TeardownError> {
        match step {
            TeardownStep::Submit => self.note_submit(),
            TeardownStep::WaitIdle => self.note_idle(),
            TeardownStep::Destroy(resource) => self.check_destroy(resource)?,
        }
        Ok(())
    }
}

/// 校验一段完整的操作序列：任何 destroy 之前，最近一次 submit 之后必须有一次 wait idle
pub fn validate_teardown<'a>(steps: impl IntoIterator<Item = &'a TeardownStep>) -> Result<(), TeardownError> {
    let mut tracker = TeardownTracker::new();
    for step in steps {
        tracker.apply(step)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destroy(name: &str) -> TeardownStep {
        TeardownStep::Destroy(name.to_string())
    }

    #[test]
    fn test_idle_then_destroy_is_valid() {
        let steps = [
            TeardownStep::Submit,
            TeardownStep::Submit,
            TeardownStep::WaitIdle,
            destroy("fence-0"),
            destroy("semaphore-0"),
        ];
        assert_eq!(validate_teardown(&steps), Ok(()));
    }

    #[test]
    fn test_destroy_before_idle_is_flagged() {
        let steps = [TeardownStep::Submit, destroy("fence-0"), TeardownStep::WaitIdle];
        assert_eq!(
            validate_teardown(&steps),
            Err(TeardownError::DestroyBeforeIdle {
                resource: "fence-0".to_string()
            })
        );
    }

    #[test]
    fn test_submit_after_idle_invalidates_it() {
        let steps = [TeardownStep::WaitIdle, TeardownStep::Submit, destroy("swapchain")];
        assert!(validate_teardown(&steps).is_err());
    }

    #[test]
    fn test_nothing_submitted_is_idle() {
        let tracker = TeardownTracker::new();
        assert!(tracker.is_idle());
        assert!(tracker.check_destroy("fence").is_ok());
    }
}
