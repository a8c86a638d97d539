//! ML-prediction capability interface (§4.5 Phase 4, §9 "duck-typed plug-ins").
//!
//! `ENABLE_ML_PREDICTIONS` selects the implementation at startup; the engine
//! always talks to the trait object, never to a concrete predictor.

use crate::types::EngineInput;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    Rug,
    TwoX,
    TenX,
    FiftyX,
    HundredXPlus,
}

#[derive(Debug, Clone, Copy)]
pub struct MlPrediction {
    pub class: OutcomeClass,
    pub confidence: f64,
}

#[async_trait]
pub trait MlPredictor: Send + Sync {
    async fn predict(&self, input: &EngineInput) -> Option<MlPrediction>;
}

/// Default implementation when `ENABLE_ML_PREDICTIONS=false`. The offline
/// training/inference pipeline itself is out of scope; this crate only
/// carries the interface.
pub struct NoopPredictor;

#[async_trait]
impl MlPredictor for NoopPredictor {
    async fn predict(&self, _input: &EngineInput) -> Option<MlPrediction> {
        None
    }
}

/// Applies the Phase 4 scoring table to a prediction.
pub fn score_prediction(prediction: &MlPrediction) -> f64 {
    let MlPrediction { class, confidence } = *prediction;
    match class {
        OutcomeClass::HundredXPlus => {
            if confidence >= 0.7 {
                20.0
            } else if confidence >= 0.5 {
                15.0
            } else {
                10.0
            }
        }
        OutcomeClass::FiftyX => {
            if confidence >= 0.6 {
                15.0
            } else {
                10.0
            }
        }
        OutcomeClass::TenX => {
            if confidence >= 0.6 {
                10.0
            } else {
                5.0
            }
        }
        OutcomeClass::TwoX => 0.0,
        OutcomeClass::Rug => {
            if confidence >= 0.5 {
                -30.0
            } else {
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hundred_x_scales_with_confidence() {
        assert_eq!(score_prediction(&MlPrediction { class: OutcomeClass::HundredXPlus, confidence: 0.9 }), 20.0);
        assert_eq!(score_prediction(&MlPrediction { class: OutcomeClass::HundredXPlus, confidence: 0.55 }), 15.0);
        assert_eq!(score_prediction(&MlPrediction { class: OutcomeClass::HundredXPlus, confidence: 0.2 }), 10.0);
    }

    #[test]
    fn rug_only_penalizes_above_confidence_threshold() {
        assert_eq!(score_prediction(&MlPrediction { class: OutcomeClass::Rug, confidence: 0.51 }), -30.0);
        assert_eq!(score_prediction(&MlPrediction { class: OutcomeClass::Rug, confidence: 0.2 }), 0.0);
    }

    #[test]
    fn two_x_is_neutral() {
        assert_eq!(score_prediction(&MlPrediction { class: OutcomeClass::TwoX, confidence: 0.99 }), 0.0);
    }
}
