use std::collections::BTreeMap;

/// Health of every upstream as reported by one metrics scrape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthSample {
    upstreams: BTreeMap<String, bool>,
}

impl HealthSample {
    pub fn insert(&mut self, upstream: String, healthy: bool) {
        // Several samples for one upstream: any unhealthy report sticks.
        let entry = self.upstreams.entry(upstream).or_insert(true);
        *entry &= healthy;
    }

    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }

    pub fn is_healthy(&self, upstream: &str) -> Option<bool> {
        self.upstreams.get(upstream).copied()
    }

    pub fn all_healthy(&self) -> bool {
        self.upstreams.values().all(|healthy| *healthy)
    }

    pub fn unhealthy(&self) -> Vec<String> {
        self.upstreams
            .iter()
            .filter(|(_, healthy)| !**healthy)
            .map(|(name, _)| name.clone())
            .collect()
    }
}
