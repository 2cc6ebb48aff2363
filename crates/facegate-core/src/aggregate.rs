use crate::error::PipelineError;
use crate::types::Embedding;

/// Strategy for collapsing one enrollment session's embeddings into one.
pub trait AggregationPolicy {
    fn aggregate(&self, samples: &[Embedding]) -> Result<Embedding, PipelineError>;
}

/// Element-wise arithmetic mean. A single sample is returned unchanged.
pub struct MeanAggregation;

impl AggregationPolicy for MeanAggregation {
    fn aggregate(&self, samples: &[Embedding]) -> Result<Embedding, PipelineError> {
        let (first, rest) = samples.split_first().ok_or(PipelineError::InsufficientSamples {
            required: 1,
            available: 0,
        })?;
        if rest.is_empty() {
            return Ok(first.clone());
        }

        let dim = first.dim();
        if let Some(bad) = rest.iter().find(|e| e.dim() != dim) {
            return Err(PipelineError::Encoding(format!(
                "cannot average {dim}-dim and {}-dim embeddings",
                bad.dim()
            )));
        }

        let mut sum = vec![0.0f64; dim];
        for sample in samples {
            for (acc, v) in sum.iter_mut().zip(&sample.values) {
                *acc += *v as f64;
            }
        }
        let n = samples.len() as f64;

        Ok(Embedding {
            values: sum.into_iter().map(|s| (s / n) as f32).collect(),
            model_version: first.model_version.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_sample_identity() {
        let e = Embedding {
            values: vec![0.123456, -0.5, 0.75],
            model_version: Some("w600k_r50".into()),
        };
        assert_eq!(MeanAggregation.aggregate(std::slice::from_ref(&e)).unwrap(), e);
    }

    #[test]
    fn test_mean() {
        let a = Embedding::new(vec![1.0, 2.0]);
        let b = Embedding::new(vec![3.0, -2.0]);
        let m = MeanAggregation.aggregate(&[a, b]).unwrap();
        assert_eq!(m.values, vec![2.0, 0.0]);
    }

    #[test]
    fn test_order_invariant() {
        let samples = vec![
            Embedding::new(vec![0.1, 0.7, -0.3]),
            Embedding::new(vec![0.4, -0.2, 0.9]),
            Embedding::new(vec![-0.6, 0.05, 0.33]),
        ];
        let forward = MeanAggregation.aggregate(&samples).unwrap();
        let reversed: Vec<_> = samples.iter().rev().cloned().collect();
        let backward = MeanAggregation.aggregate(&reversed).unwrap();
        for (a, b) in forward.values.iter().zip(&backward.values) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_mean_within_half_distance() {
        let a = Embedding::new(vec![0.0, 0.0, 0.0]);
        let b = Embedding::new(vec![0.06, 0.0, 0.08]);
        let m = MeanAggregation.aggregate(&[a.clone(), b.clone()]).unwrap();
        assert!((m.distance(&a) - 0.05).abs() < 1e-6);
        assert!((m.distance(&b) - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_empty_is_insufficient() {
        assert!(matches!(
            MeanAggregation.aggregate(&[]),
            Err(PipelineError::InsufficientSamples { required: 1, available: 0 })
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = Embedding::new(vec![1.0, 2.0]);
        let b = Embedding::new(vec![1.0]);
        assert!(matches!(
            MeanAggregation.aggregate(&[a, b]),
            Err(PipelineError::Encoding(_))
        ));
    }
}
