// Сбор ошибок: запоминаем все, наружу отдаём первую

use crate::utils::error::{LoginError, LoginFailed};
use tracing::debug;

/// Накопитель ошибок за время одного `login()`.
///
/// Первая ошибка считается первопричиной, остальные прикладываются как контекст.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Vec<LoginFailed>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn collect(&mut self, error: LoginFailed) {
        debug!(error = %error, collected = self.errors.len(), "collected login error");
        if !self.errors.contains(&error) {
            self.errors.push(error);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn first(&self) -> Option<&LoginFailed> {
        self.errors.first()
    }

    /// Забрать все собранные ошибки
    pub fn drain(&mut self) -> Vec<LoginFailed> {
        std::mem::take(&mut self.errors)
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }

    /// Собрать `error` и вернуть итоговую ошибку с первопричиной во главе
    pub fn collect_throw(&mut self, error: LoginFailed) -> LoginError {
        self.collect(error);
        self.throw_first()
            .unwrap_or(LoginError::Failed {
                cause: LoginFailed::AuthMethodsExhausted,
                suppressed: Vec::new(),
            })
    }

    /// Первая собранная ошибка, остальные как suppressed. Опустошает коллектор.
    pub fn throw_first(&mut self) -> Option<LoginError> {
        if self.errors.is_empty() {
            return None;
        }
        let mut errors = std::mem::take(&mut self.errors);
        let cause = errors.remove(0);
        Some(LoginError::from_collected(cause, errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::NetworkError;

    #[test]
    fn test_first_cause_wins() {
        let mut collector = ErrorCollector::new();
        collector.collect(LoginFailed::RetryLater("first".into()));
        let err = collector.collect_throw(LoginFailed::WrongPassword("second".into()));

        match err {
            LoginError::Failed { cause, suppressed } => {
                assert_eq!(cause, LoginFailed::RetryLater("first".into()));
                assert_eq!(suppressed, vec![LoginFailed::WrongPassword("second".into())]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(collector.is_empty());
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let mut collector = ErrorCollector::new();
        let timeout = LoginFailed::Network(NetworkError::Timeout("wtlogin.login".into()));
        collector.collect(timeout.clone());
        collector.collect(timeout.clone());
        let err = collector.throw_first().unwrap();
        assert!(err.suppressed().is_empty());
        assert!(collector.throw_first().is_none());
    }
}
