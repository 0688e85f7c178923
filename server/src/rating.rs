//! Rating settlement seam.
//!
//! The orchestration layer only needs a signed delta per player when a game
//! settles; how ratings are actually computed and persisted belongs to the
//! rating service behind this trait.

use shared::{PlayerIdentity, RatingDeltas, Side};

pub trait RatingService: Send + Sync {
    /// Signed rating changes for the white and black players given the game
    /// outcome (`None` = draw). Called only for decisive or drawn results,
    /// never for aborted games.
    fn settle(
        &self,
        white: &PlayerIdentity,
        black: &PlayerIdentity,
        winner: Option<Side>,
    ) -> RatingDeltas;
}

/// Standard Elo with a fixed K-factor.
pub struct EloRating {
    pub k: f64,
}

impl Default for EloRating {
    fn default() -> Self {
        Self { k: 32.0 }
    }
}

impl RatingService for EloRating {
    fn settle(
        &self,
        white: &PlayerIdentity,
        black: &PlayerIdentity,
        winner: Option<Side>,
    ) -> RatingDeltas {
        let expected_white = 1.0
            / (1.0 + 10f64.powf(f64::from(black.rating - white.rating) / 400.0));
        let score_white = match winner {
            Some(Side::White) => 1.0,
            Some(Side::Black) => 0.0,
            None => 0.5,
        };
        let delta = (self.k * (score_white - expected_white)).round() as i32;
        RatingDeltas {
            white: delta,
            black: -delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(rating: i32) -> PlayerIdentity {
        PlayerIdentity {
            id: format!("p{rating}"),
            display_name: format!("p{rating}"),
            rating,
        }
    }

    #[test]
    fn equal_ratings_draw_is_zero() {
        let elo = EloRating::default();
        let deltas = elo.settle(&player(1200), &player(1200), None);
        assert_eq!(deltas.white, 0);
        assert_eq!(deltas.black, 0);
    }

    #[test]
    fn equal_ratings_win_is_half_k() {
        let elo = EloRating::default();
        let deltas = elo.settle(&player(1200), &player(1200), Some(Side::White));
        assert_eq!(deltas.white, 16);
        assert_eq!(deltas.black, -16);
    }

    #[test]
    fn underdog_win_pays_more() {
        let elo = EloRating::default();
        let favorite = elo.settle(&player(1600), &player(1200), Some(Side::White));
        let underdog = elo.settle(&player(1200), &player(1600), Some(Side::White));
        assert!(underdog.white > favorite.white);
        assert_eq!(underdog.white, -underdog.black);
    }
}
