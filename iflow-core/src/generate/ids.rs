use std::collections::{HashMap, HashSet};

/// Deterministic id allocation for one document.
///
/// Blueprint ids are claimed first (sanitized to NCNames, suffixed `_2`, `_3`
/// on collision); synthesized elements then draw `Prefix_N` ids that skip
/// anything already claimed.
#[derive(Debug, Default)]
pub struct IdScheme {
    used: HashSet<String>,
    counters: HashMap<String, usize>,
}

impl IdScheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `preferred` (sanitized), or the first free `_N` variant of it.
    pub fn claim(&mut self, preferred: &str) -> String {
        let base = sanitize_ncname(preferred);
        if self.used.insert(base.clone()) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}_{}", base, n);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Next free `{prefix}_{n}`, counting per prefix from 1.
    pub fn next(&mut self, prefix: &str) -> String {
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{}_{}", prefix, counter);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    pub fn is_used(&self, id: &str) -> bool {
        self.used.contains(id)
    }
}

/// Map a blueprint id onto an NCName the platform accepts: ASCII letters,
/// digits, `_`, `-` and `.`, starting with a letter or `_`. Each run of other
/// characters collapses into one `_`.
pub fn sanitize_ncname(s: &str) -> String {
    let mut id = String::with_capacity(s.len() + 1);
    let mut in_run = false;
    for ch in s.trim().chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.') {
            id.push(ch);
            in_run = false;
        } else if !in_run {
            id.push('_');
            in_run = true;
        }
    }
    match id.chars().next() {
        None => "_id".to_string(),
        Some(first) if first.is_ascii_alphabetic() || first == '_' => id,
        Some(_) => format!("_{}", id),
    }
}

/// Archive file stem for an iFlow name. Characters outside `[A-Za-z0-9_.-]`
/// become `_` and leading dots are dropped, so the result is a single path
/// segment.
pub fn artifact_name(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_start_matches('.');
    if stem.is_empty() {
        "IntegrationFlow".to_string()
    } else {
        stem.to_string()
    }
}

pub fn shape_id(element_id: &str) -> String {
    format!("BPMNShape_{}", element_id)
}

pub fn edge_id(flow_id: &str) -> String {
    format!("BPMNEdge_{}", flow_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_ncname() {
        assert_eq!(sanitize_ncname("cm1"), "cm1");
        assert_eq!(sanitize_ncname("1st step"), "_1st_step");
        assert_eq!(sanitize_ncname("a:b"), "a_b");
        assert_eq!(sanitize_ncname("order  / lines"), "order_lines");
        assert_eq!(sanitize_ncname("-retry"), "_-retry");
        assert_eq!(sanitize_ncname(""), "_id");
    }

    #[test]
    fn test_artifact_name_stays_one_segment() {
        assert_eq!(artifact_name("OrderSync"), "OrderSync");
        assert_eq!(artifact_name("../x"), "_x");
        assert_eq!(artifact_name("a/b"), "a_b");
        assert_eq!(artifact_name("Order Sync v1.2"), "Order_Sync_v1.2");
        assert_eq!(artifact_name(".."), "IntegrationFlow");
    }

    #[test]
    fn test_claim_suffixes_collisions() {
        let mut ids = IdScheme::new();
        assert_eq!(ids.claim("StartEvent"), "StartEvent");
        assert_eq!(ids.claim("StartEvent"), "StartEvent_2");
        assert_eq!(ids.claim("StartEvent"), "StartEvent_3");
    }

    #[test]
    fn test_next_skips_claimed() {
        let mut ids = IdScheme::new();
        ids.claim("Participant_1");
        assert_eq!(ids.next("Participant"), "Participant_2");
        assert_eq!(ids.next("Participant"), "Participant_3");
        assert_eq!(ids.next("MessageFlow"), "MessageFlow_1");
        assert!(ids.is_used("MessageFlow_1"));
    }
}
