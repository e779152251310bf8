use rand::{Rng, rng};

use crate::error::ConfigError;

const DESKTOP_UAS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/119.0",
    "Mozilla/5.0 (Windows NT 10.0; rv:114.0) Gecko/20100101 Firefox/114.0",
];

/// Non-empty set of User-Agent strings, one picked at random per request.
#[derive(Debug, Clone)]
pub struct IdentityPool {
    agents: Vec<String>,
}

impl IdentityPool {
    pub fn new(agents: Vec<String>) -> Result<Self, ConfigError> {
        if agents.is_empty() {
            return Err(ConfigError::EmptyIdentityPool);
        }
        Ok(Self { agents })
    }

    pub fn single(agent: impl Into<String>) -> Self {
        Self {
            agents: vec![agent.into()],
        }
    }

    pub fn pick(&self) -> &str {
        let i = rng().random_range(0..self.agents.len());
        &self.agents[i]
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn as_slice(&self) -> &[String] {
        &self.agents
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self {
            agents: DESKTOP_UAS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn empty_pool_is_rejected() {
        assert!(matches!(
            IdentityPool::new(Vec::new()),
            Err(ConfigError::EmptyIdentityPool)
        ));
    }

    #[test]
    fn single_pool_is_deterministic() {
        let pool = IdentityPool::single("test-agent/1.0");
        for _ in 0..20 {
            assert_eq!(pool.pick(), "test-agent/1.0");
        }
    }

    #[test]
    fn picks_stay_inside_the_pool() {
        let pool = IdentityPool::default();
        let known: HashSet<&str> = DESKTOP_UAS.iter().copied().collect();
        let mut seen = HashSet::new();
        for _ in 0..400 {
            let ua = pool.pick();
            assert!(known.contains(ua));
            seen.insert(ua.to_string());
        }
        // 400 uniform draws over 4 entries miss one with negligible probability
        assert_eq!(seen.len(), DESKTOP_UAS.len());
    }
}
