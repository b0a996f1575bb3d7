use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::RouterDecision;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LabelTally {
    pub sum_confidence: f64,
    pub frame_count: u32,
}

/// Consensus over a batch of per-frame decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchConsensus {
    pub label: Option<String>,
    /// Mean confidence of the winner over the frames that voted for it.
    pub confidence: f32,
    /// All input frames, voting or not.
    pub frames: usize,
    pub tallies: BTreeMap<String, LabelTally>,
}

/// Incremental consensus. Frames without a label count toward `frames` only.
#[derive(Debug, Default)]
pub struct ConsensusAggregator {
    tallies: BTreeMap<String, LabelTally>,
    frames: usize,
}

impl ConsensusAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: Option<&str>, confidence: f32) {
        self.frames += 1;
        let Some(label) = label else { return; };
        let tally = self.tallies.entry(label.to_string()).or_default();
        tally.sum_confidence += confidence as f64;
        tally.frame_count += 1;
    }

    pub fn push_decision(&mut self, decision: &RouterDecision) {
        self.push(decision.label.as_deref(), decision.confidence);
    }

    /// Winner maximizes (sum, count); a full tie goes to the smaller label.
    pub fn finish(self) -> BatchConsensus {
        let mut winner: Option<(&String, &LabelTally)> = None;
        for (label, tally) in &self.tallies {
            let better = match winner {
                None => true,
                Some((_, best)) => {
                    tally.sum_confidence > best.sum_confidence
                        || (tally.sum_confidence == best.sum_confidence && tally.frame_count > best.frame_count)
                }
            };
            if better {
                winner = Some((label, tally));
            }
        }

        let (label, confidence) = match winner {
            Some((label, tally)) if tally.frame_count > 0 => {
                (Some(label.clone()), (tally.sum_confidence / tally.frame_count as f64) as f32)
            }
            _ => (None, 0.0),
        };
        BatchConsensus { label, confidence, frames: self.frames, tallies: self.tallies }
    }
}

pub fn aggregate<'a, I>(decisions: I) -> BatchConsensus
where
    I: IntoIterator<Item = &'a RouterDecision>,
{
    let mut agg = ConsensusAggregator::new();
    for d in decisions {
        agg.push_decision(d);
    }
    agg.finish()
}
