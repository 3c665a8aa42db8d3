//! Reputation tiers and the dashboard numbers derived from contract reads.
//!
//! The contract's score is authoritative. Everything here is display-level
//! arithmetic on top of it.

use serde::{Deserialize, Serialize};

/// `getHustleScore` result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HustleScore {
    pub score: u128,
    pub reliability: u128,
    pub experience: u128,
}

/// `getReputationData` result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationData {
    pub total_score: u128,
    pub total_weight: u128,
    pub task_count: u128,
    pub dispute_count: u128,
    pub last_updated: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReputationTier {
    Newcomer,
    Rising,
    Skilled,
    Expert,
    Master,
    Legend,
}

impl ReputationTier {
    /// Ordered, contiguous bands starting at zero. Only the last is open-ended.
    pub const ALL: [ReputationTier; 6] = [
        ReputationTier::Newcomer,
        ReputationTier::Rising,
        ReputationTier::Skilled,
        ReputationTier::Expert,
        ReputationTier::Master,
        ReputationTier::Legend,
    ];

    pub fn min(self) -> u128 {
        match self {
            ReputationTier::Newcomer => 0,
            ReputationTier::Rising => 10_000,
            ReputationTier::Skilled => 50_000,
            ReputationTier::Expert => 100_000,
            ReputationTier::Master => 250_000,
            ReputationTier::Legend => 500_000,
        }
    }

    /// Exclusive upper bound; `None` for the open-ended top band.
    pub fn max(self) -> Option<u128> {
        self.next().map(ReputationTier::min)
    }

    pub fn label(self) -> &'static str {
        match self {
            ReputationTier::Newcomer => "Newcomer",
            ReputationTier::Rising => "Rising",
            ReputationTier::Skilled => "Skilled",
            ReputationTier::Expert => "Expert",
            ReputationTier::Master => "Master",
            ReputationTier::Legend => "Legend",
        }
    }

    pub fn next(self) -> Option<ReputationTier> {
        Self::ALL.get(self as usize + 1).copied()
    }

    pub fn contains(self, score: u128) -> bool {
        score >= self.min() && self.max().is_none_or(|max| score < max)
    }

    pub fn for_score(score: u128) -> ReputationTier {
        Self::ALL
            .into_iter()
            .find(|&tier| tier.contains(score))
            .unwrap_or(ReputationTier::Newcomer)
    }

    /// First band whose floor lies above `score`.
    pub fn next_for_score(score: u128) -> Option<ReputationTier> {
        Self::ALL.into_iter().find(|&tier| tier.min() > score)
    }
}

/// Presentation-only scaling shown next to the score. It never feeds back
/// into any number read from the contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperienceMultiplier {
    Base,
    Seasoned,
    Veteran,
}

impl ExperienceMultiplier {
    pub fn for_experience(experience: u128) -> Self {
        match experience {
            0..=50 => ExperienceMultiplier::Base,
            51..=100 => ExperienceMultiplier::Seasoned,
            _ => ExperienceMultiplier::Veteran,
        }
    }

    pub fn factor(self) -> f64 {
        match self {
            ExperienceMultiplier::Base => 1.0,
            ExperienceMultiplier::Seasoned => 1.5,
            ExperienceMultiplier::Veteran => 2.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ExperienceMultiplier::Base => "1.0x",
            ExperienceMultiplier::Seasoned => "1.5x",
            ExperienceMultiplier::Veteran => "2.0x",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DisplayHeuristics {
    pub experience_multiplier: ExperienceMultiplier,
    pub multiplier_label: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReputationView {
    pub score: u128,
    pub reliability: u8,
    pub experience: u128,
    pub task_count: u128,
    pub dispute_count: u128,
    pub total_weight: u128,
    pub last_updated: u64,
    pub current_level: ReputationTier,
    pub next_level: Option<ReputationTier>,
    pub progress_to_next: f64,
    pub points_to_next: Option<u128>,
    pub avg_score_per_task: f64,
    pub difficulty_average: u128,
    pub heuristics: DisplayHeuristics,
}

impl ReputationView {
    pub fn derive(score: HustleScore, data: ReputationData) -> Self {
        let s = score.score;
        let current_level = ReputationTier::for_score(s);
        let next_level = ReputationTier::next_for_score(s);
        let multiplier = ExperienceMultiplier::for_experience(score.experience);

        Self {
            score: s,
            reliability: score.reliability.min(100) as u8,
            experience: score.experience,
            task_count: data.task_count,
            dispute_count: data.dispute_count,
            total_weight: data.total_weight,
            last_updated: data.last_updated,
            current_level,
            next_level,
            progress_to_next: progress_to_next(s, current_level, next_level),
            points_to_next: next_level.map(|next| next.min() - s),
            avg_score_per_task: avg_score_per_task(s, data.task_count),
            difficulty_average: if data.task_count > 0 {
                (s as f64 / data.task_count as f64).round() as u128
            } else {
                0
            },
            heuristics: DisplayHeuristics {
                experience_multiplier: multiplier,
                multiplier_label: multiplier.label(),
            },
        }
    }
}

/// Dashboard state for the connected wallet.
///
/// The gateway only ever answers with `NoIdentity` or `Ready`. `Loading` is
/// the state a consumer holds between connecting a wallet and receiving its
/// first answer, so it is serialized with the same tag as the others.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", content = "view", rename_all = "snake_case")]
pub enum ReputationState {
    NoIdentity,
    Loading,
    Ready(ReputationView),
}

pub fn progress_to_next(score: u128, current: ReputationTier, next: Option<ReputationTier>) -> f64 {
    let Some(next) = next else {
        return 100.0;
    };
    let span = next.min().saturating_sub(current.min());
    if span == 0 {
        return 100.0;
    }
    let done = score.saturating_sub(current.min());
    (done as f64 / span as f64 * 100.0).clamp(0.0, 100.0)
}

pub fn avg_score_per_task(score: u128, task_count: u128) -> f64 {
    if task_count == 0 {
        return 0.0;
    }
    round2(score as f64 / task_count as f64)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(score: u128, task_count: u128) -> ReputationView {
        ReputationView::derive(
            HustleScore {
                score,
                reliability: 90,
                experience: task_count,
            },
            ReputationData {
                total_score: score,
                task_count,
                ..Default::default()
            },
        )
    }

    #[test]
    fn bands_are_contiguous_and_start_at_zero() {
        assert_eq!(ReputationTier::ALL[0].min(), 0);
        for pair in ReputationTier::ALL.windows(2) {
            assert_eq!(pair[0].max(), Some(pair[1].min()));
        }
        assert_eq!(ReputationTier::Legend.max(), None);
    }

    #[test]
    fn next_band_is_the_first_floor_above_score() {
        assert_eq!(ReputationTier::next_for_score(0), Some(ReputationTier::Rising));
        assert_eq!(ReputationTier::next_for_score(9_999), Some(ReputationTier::Rising));
        assert_eq!(ReputationTier::next_for_score(10_000), Some(ReputationTier::Skilled));
        assert_eq!(ReputationTier::next_for_score(499_999), Some(ReputationTier::Legend));
        assert_eq!(ReputationTier::next_for_score(500_000), None);
        assert_eq!(ReputationTier::for_score(u128::MAX), ReputationTier::Legend);
    }

    #[test]
    fn exactly_one_band_matches_every_score() {
        let scores = [
            0, 1, 9_999, 10_000, 49_999, 50_000, 99_999, 100_000, 249_999, 250_000, 499_999,
            500_000, 10_000_000, u128::MAX,
        ];
        for s in scores {
            let matching = ReputationTier::ALL.iter().filter(|t| t.contains(s)).count();
            assert_eq!(matching, 1, "score {s}");
        }
    }

    #[test]
    fn skilled_midpoint() {
        let v = view(75_000, 10);
        assert_eq!(v.current_level, ReputationTier::Skilled);
        assert_eq!(v.current_level.label(), "Skilled");
        assert_eq!(v.next_level, Some(ReputationTier::Expert));
        assert_eq!(v.progress_to_next, 50.0);
        assert_eq!(v.points_to_next, Some(25_000));
    }

    #[test]
    fn legend_is_complete() {
        let v = view(750_000, 3);
        assert_eq!(v.current_level, ReputationTier::Legend);
        assert_eq!(v.next_level, None);
        assert_eq!(v.progress_to_next, 100.0);
        assert_eq!(v.points_to_next, None);
    }

    #[test]
    fn progress_resets_on_band_entry_and_stays_bounded() {
        let mut last = -1.0;
        for s in (50_000..100_000).step_by(997) {
            let p = view(s, 1).progress_to_next;
            assert!((0.0..=100.0).contains(&p));
            assert!(p >= last);
            last = p;
        }
        assert_eq!(view(100_000, 1).progress_to_next, 0.0);
    }

    #[test]
    fn zero_tasks_average_is_zero() {
        let v = view(0, 0);
        assert_eq!(v.avg_score_per_task, 0.0);
        assert_eq!(v.difficulty_average, 0);
        assert_eq!(v.current_level, ReputationTier::Newcomer);
    }

    #[test]
    fn average_rounds_to_two_decimals() {
        assert_eq!(avg_score_per_task(10_000, 3), 3333.33);
        assert_eq!(avg_score_per_task(2, 3), 0.67);
    }

    #[test]
    fn reliability_is_clamped() {
        let v = ReputationView::derive(
            HustleScore {
                score: 1,
                reliability: 250,
                experience: 0,
            },
            ReputationData::default(),
        );
        assert_eq!(v.reliability, 100);
    }

    #[test]
    fn experience_multiplier_thresholds() {
        assert_eq!(ExperienceMultiplier::for_experience(50).factor(), 1.0);
        assert_eq!(ExperienceMultiplier::for_experience(51).factor(), 1.5);
        assert_eq!(ExperienceMultiplier::for_experience(100).factor(), 1.5);
        assert_eq!(ExperienceMultiplier::for_experience(101).factor(), 2.0);
    }

    #[test]
    fn zero_width_band_does_not_produce_nan() {
        let p = progress_to_next(5, ReputationTier::Newcomer, Some(ReputationTier::Newcomer));
        assert_eq!(p, 100.0);
    }
}
