//! Worker selection policies
//!
//! The router filters the roster down to eligible candidates (online, serves
//! the kind, holds the required skills, below full utilization) and hands
//! them to a [`WorkerSelector`], which only decides *which* one.

use sy_common::{SelectionStrategy, WorkItem, WorkerInfo};

/// An eligible worker together with the core's view of its current load
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub worker: &'a WorkerInfo,
    pub active: u32,
}

impl Candidate<'_> {
    pub fn utilization(&self) -> f64 {
        if self.worker.capacity == 0 {
            return 1.0;
        }
        self.active as f64 / self.worker.capacity as f64
    }
}

/// Chosen candidate index and the score recorded on the routing decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub index: usize,
    pub score: f64,
}

pub trait WorkerSelector: Send {
    fn name(&self) -> &'static str;

    /// Pick one of `candidates`. Candidates are sorted by worker id and
    /// never empty.
    fn select(&mut self, item: &WorkItem, candidates: &[Candidate<'_>]) -> Option<Selection>;
}

pub fn selector_for(strategy: SelectionStrategy) -> Box<dyn WorkerSelector> {
    match strategy {
        SelectionStrategy::RoundRobin => Box::new(RoundRobinSelector::default()),
        SelectionStrategy::LeastLoaded => Box::new(LeastLoadedSelector),
        SelectionStrategy::SkillWeighted => Box::new(SkillWeightedSelector::default()),
    }
}

/// Rotates through workers by id, resuming after the last one picked
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    last_worker: Option<String>,
}

impl WorkerSelector for RoundRobinSelector {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn select(&mut self, _item: &WorkItem, candidates: &[Candidate<'_>]) -> Option<Selection> {
        if candidates.is_empty() {
            return None;
        }
        let index = match &self.last_worker {
            Some(last) => candidates
                .iter()
                .position(|c| c.worker.id.as_str() > last.as_str())
                .unwrap_or(0),
            None => 0,
        };
        self.last_worker = Some(candidates[index].worker.id.clone());
        Some(Selection {
            index,
            score: 1.0 - candidates[index].utilization(),
        })
    }
}

/// Lowest utilization wins; ties go to fewer active items, then worker id
#[derive(Debug, Default)]
pub struct LeastLoadedSelector;

impl WorkerSelector for LeastLoadedSelector {
    fn name(&self) -> &'static str {
        "least_loaded"
    }

    fn select(&mut self, _item: &WorkItem, candidates: &[Candidate<'_>]) -> Option<Selection> {
        let (index, best) = candidates.iter().enumerate().min_by(|(_, a), (_, b)| {
            a.utilization()
                .total_cmp(&b.utilization())
                .then(a.active.cmp(&b.active))
        })?;
        Some(Selection {
            index,
            score: 1.0 - best.utilization(),
        })
    }
}

/// Prefers specialists: workers whose skill set is mostly the skills the
/// item asks for, blended with spare capacity.
#[derive(Debug)]
pub struct SkillWeightedSelector {
    pub skill_weight: f64,
}

impl Default for SkillWeightedSelector {
    fn default() -> Self {
        Self { skill_weight: 0.6 }
    }
}

impl SkillWeightedSelector {
    fn score(&self, item: &WorkItem, candidate: &Candidate<'_>) -> f64 {
        let skills = &candidate.worker.skills;
        let fit = if item.skills.is_empty() || skills.is_empty() {
            0.0
        } else {
            let matched = item.skills.iter().filter(|s| skills.contains(s)).count();
            matched as f64 / skills.len() as f64
        };
        self.skill_weight * fit + (1.0 - self.skill_weight) * (1.0 - candidate.utilization())
    }
}

impl WorkerSelector for SkillWeightedSelector {
    fn name(&self) -> &'static str {
        "skill_weighted"
    }

    fn select(&mut self, item: &WorkItem, candidates: &[Candidate<'_>]) -> Option<Selection> {
        let mut best: Option<Selection> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            let score = self.score(item, candidate);
            // Strictly greater keeps the lowest id on ties
            if best.map_or(true, |b| score > b.score) {
                best = Some(Selection { index, score });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Instant;
    use sy_common::{WorkKind, WorkRequest};

    fn call(skills: &[&str]) -> WorkItem {
        let request = WorkRequest::new("c1", "p").with_skills(skills.iter().copied());
        WorkItem::new(WorkKind::Call, request, Instant::now(), Utc::now())
    }

    fn worker(id: &str, capacity: u32, skills: &[&str]) -> WorkerInfo {
        WorkerInfo::new(id, &[WorkKind::Call], capacity).with_skills(skills.iter().copied())
    }

    #[test]
    fn test_round_robin_rotates_and_wraps() {
        let a = worker("a", 2, &[]);
        let b = worker("b", 2, &[]);
        let c = worker("c", 2, &[]);
        let candidates = [
            Candidate { worker: &a, active: 0 },
            Candidate { worker: &b, active: 0 },
            Candidate { worker: &c, active: 0 },
        ];
        let mut selector = RoundRobinSelector::default();
        let item = call(&[]);

        let picks: Vec<usize> = (0..4)
            .map(|_| selector.select(&item, &candidates).unwrap().index)
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_round_robin_skips_missing_worker() {
        let a = worker("a", 1, &[]);
        let c = worker("c", 1, &[]);
        let mut selector = RoundRobinSelector {
            last_worker: Some("a".to_string()),
        };
        let candidates = [Candidate { worker: &a, active: 0 }, Candidate { worker: &c, active: 0 }];
        assert_eq!(selector.select(&call(&[]), &candidates).unwrap().index, 1);
    }

    #[test]
    fn test_least_loaded_prefers_lower_utilization() {
        let busy = worker("a", 2, &[]);
        let idle = worker("b", 4, &[]);
        let candidates = [
            Candidate { worker: &busy, active: 1 },
            Candidate { worker: &idle, active: 1 },
        ];
        let selection = LeastLoadedSelector.select(&call(&[]), &candidates).unwrap();
        assert_eq!(selection.index, 1);
        assert!((selection.score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_least_loaded_tie_goes_to_first_by_id() {
        let a = worker("a", 2, &[]);
        let b = worker("b", 2, &[]);
        let candidates = [Candidate { worker: &a, active: 0 }, Candidate { worker: &b, active: 0 }];
        assert_eq!(LeastLoadedSelector.select(&call(&[]), &candidates).unwrap().index, 0);
    }

    #[test]
    fn test_skill_weighted_prefers_specialist() {
        let generalist = worker("a", 1, &["billing", "sales", "support", "tech"]);
        let specialist = worker("b", 1, &["billing"]);
        let candidates = [
            Candidate { worker: &generalist, active: 0 },
            Candidate { worker: &specialist, active: 0 },
        ];
        let mut selector = SkillWeightedSelector::default();
        let selection = selector.select(&call(&["billing"]), &candidates).unwrap();
        assert_eq!(selection.index, 1);
    }

    #[test]
    fn test_empty_candidates_select_nothing() {
        let item = call(&[]);
        assert!(RoundRobinSelector::default().select(&item, &[]).is_none());
        assert!(LeastLoadedSelector.select(&item, &[]).is_none());
        assert!(SkillWeightedSelector::default().select(&item, &[]).is_none());
    }
}
