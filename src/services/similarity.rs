use crate::error::{ApiError, Result};
use ndarray::{Array1, ArrayView1};

/// Cosine distance, `1 - cos(a, b)`. A zero vector is treated as unrelated to
/// everything, i.e. distance 1.
pub fn cosine_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        1.0
    } else {
        1.0 - a.dot(&b) / (norm_a * norm_b)
    }
}

/// Distance from `query` to every embedding, in input order.
pub fn distances_from_embeddings<'a, I>(query: &[f32], embeddings: I) -> Result<Vec<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let query = ArrayView1::from(query);

    embeddings
        .into_iter()
        .enumerate()
        .map(|(i, embedding)| {
            if embedding.len() != query.len() {
                return Err(ApiError::DataError(format!(
                    "Embedding {} has dimension {}, query has {}",
                    i,
                    embedding.len(),
                    query.len()
                )));
            }
            Ok(cosine_distance(query, ArrayView1::from(embedding)))
        })
        .collect()
}

/// Indices sorted by ascending distance. Ties keep their input order.
pub fn indices_of_nearest_neighbors(distances: &[f32]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..distances.len()).collect();
    indices.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]));
    indices
}

/// Element-wise mean of equally sized vectors, `None` for an empty input.
pub fn mean_embedding<'a, I>(embeddings: I) -> Result<Option<Vec<f32>>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut sum: Option<Array1<f32>> = None;
    let mut count = 0usize;

    for embedding in embeddings {
        let row = ArrayView1::from(embedding);
        match sum.as_mut() {
            None => sum = Some(row.to_owned()),
            Some(acc) if acc.len() == row.len() => *acc += &row,
            Some(acc) => {
                return Err(ApiError::DataError(format!(
                    "Cannot average embeddings of dimension {} and {}",
                    acc.len(),
                    row.len()
                )))
            }
        }
        count += 1;
    }

    Ok(sum.map(|acc| (acc / count as f32).to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_cosine_distance() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let c = [2.0, 0.0];
        let d = [-1.0, 0.0];

        assert!(approx_eq(cosine_distance(ArrayView1::from(&a[..]), ArrayView1::from(&b[..])), 1.0));
        assert!(approx_eq(cosine_distance(ArrayView1::from(&a[..]), ArrayView1::from(&c[..])), 0.0));
        assert!(approx_eq(cosine_distance(ArrayView1::from(&a[..]), ArrayView1::from(&d[..])), 2.0));
    }

    #[test]
    fn test_zero_vector_distance() {
        let zero = [0.0, 0.0];
        let a = [1.0, 1.0];
        assert_eq!(
            cosine_distance(ArrayView1::from(&zero[..]), ArrayView1::from(&a[..])),
            1.0
        );
    }

    #[test]
    fn test_distances_reject_dimension_mismatch() {
        let embeddings = vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]];
        let result = distances_from_embeddings(&[1.0, 0.0], embeddings.iter().map(Vec::as_slice));
        assert!(matches!(result, Err(ApiError::DataError(_))));
    }

    #[test]
    fn test_nearest_neighbors_order_is_stable() {
        let distances = [0.5, 0.1, 0.5, 0.0];
        assert_eq!(indices_of_nearest_neighbors(&distances), vec![3, 1, 0, 2]);
        assert!(indices_of_nearest_neighbors(&[]).is_empty());
    }

    #[test]
    fn test_mean_embedding() {
        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let mean = mean_embedding(rows.iter().map(Vec::as_slice)).unwrap();
        assert_eq!(mean, Some(vec![2.0, 3.0]));

        let empty: Vec<Vec<f32>> = vec![];
        assert_eq!(mean_embedding(empty.iter().map(Vec::as_slice)).unwrap(), None);

        let uneven = vec![vec![1.0], vec![1.0, 2.0]];
        assert!(mean_embedding(uneven.iter().map(Vec::as_slice)).is_err());
    }
}
