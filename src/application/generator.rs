use crate::domain::ports::Submission;
use crate::domain::transaction::CorrelationKey;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

const ID_PREFIX: &str = "tx-";
const ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_LEN: usize = 8;

/// Produces synthetic transactions with unique identifiers.
///
/// Identifiers are never reused within one generator, so two pending
/// records can never share a correlation key.
pub struct TransactionGenerator {
    rng: StdRng,
    payload_len: usize,
    issued: HashSet<String>,
}

impl TransactionGenerator {
    pub fn new(payload_len: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            payload_len,
            issued: HashSet::new(),
        }
    }

    pub fn next_submission(&mut self) -> Submission {
        let label = loop {
            let candidate = self.random_id();
            if self.issued.insert(candidate.clone()) {
                break candidate;
            }
        };

        let mut payload = vec![0u8; self.payload_len];
        self.rng.fill(&mut payload[..]);

        Submission {
            key: CorrelationKey::new(label.as_bytes(), payload),
            label,
        }
    }

    fn random_id(&mut self) -> String {
        let suffix: String = (0..ID_LEN)
            .map(|_| ID_CHARSET[self.rng.gen_range(0..ID_CHARSET.len())] as char)
            .collect();
        format!("{ID_PREFIX}{suffix}")
    }
}
