use serde::{Deserialize, Serialize};

use crate::model::ObjectiveScore;

/// A retained iteration of the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainLink {
    /// Number of jumps attempted when the link was recorded.
    pub iteration: u64,
    /// Objective decomposition of the current state.
    pub score: ObjectiveScore,
    pub step_size: f64,
    /// Accepted over attempted jumps since the start of the chain.
    pub acceptance_rate: f64,
    /// Accepted over attempted jumps since the last step size adaptation.
    pub acceptance_rate_since_adapt: f64,
    /// Parameter values of the current state, in registry order.
    pub values: Vec<f64>,
}

/// Append-only sequence of retained links, in iteration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    links: Vec<ChainLink>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, link: ChainLink) {
        debug_assert!(self
            .links
            .last()
            .is_none_or(|last| last.iteration <= link.iteration));
        self.links.push(link);
    }

    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    pub fn last(&self) -> Option<&ChainLink> {
        self.links.last()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainLink> {
        self.links.iter()
    }

    pub fn into_links(self) -> Vec<ChainLink> {
        self.links
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn link(iteration: u64) -> ChainLink {
        ChainLink {
            iteration,
            score: ObjectiveScore::default(),
            step_size: 1.,
            acceptance_rate: 0.,
            acceptance_rate_since_adapt: 0.,
            values: vec![],
        }
    }

    #[test]
    fn keeps_links_in_order() {
        let mut chain = Chain::new();
        assert!(chain.last().is_none());
        for iteration in [1, 5, 5, 10] {
            chain.push(link(iteration));
        }
        assert_eq!(chain.len(), 4);
        assert_eq!(chain.last().map(|l| l.iteration), Some(10));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn rejects_earlier_iterations() {
        let mut chain = Chain::new();
        chain.push(link(5));
        chain.push(link(4));
    }
}
