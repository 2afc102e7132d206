//! DBSCAN over haversine distance.
//!
//! Items are referenced by their index in the input slice. Items without a
//! coordinate take no part: they are neither clustered nor reported as noise.

use std::collections::VecDeque;

use super::{haversine_km, Located};

/// Result of a clustering pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbscanResult {
    /// Clusters in discovery order, member indices ascending.
    pub clusters: Vec<Vec<usize>>,
    /// Located items that belong to no cluster, ascending.
    pub noise: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Unvisited,
    Noise,
    Cluster(usize),
}

/// Cluster `items` with radius `epsilon_km`. A point is a core point when at
/// least `min_samples` located items (itself included) lie within the radius.
pub fn cluster<T: Located>(items: &[T], epsilon_km: f64, min_samples: usize) -> DbscanResult {
    let coords: Vec<Option<(f64, f64)>> = items.iter().map(Located::location).collect();
    let min_samples = min_samples.max(1);

    let neighbours = |idx: usize| -> Vec<usize> {
        let Some((lat, lon)) = coords[idx] else {
            return Vec::new();
        };
        coords
            .iter()
            .enumerate()
            .filter_map(|(j, c)| match c {
                Some((o_lat, o_lon)) if haversine_km(lat, lon, *o_lat, *o_lon) <= epsilon_km => {
                    Some(j)
                }
                _ => None,
            })
            .collect()
    };

    let mut labels = vec![Label::Unvisited; items.len()];
    let mut cluster_count = 0usize;

    for idx in 0..items.len() {
        if coords[idx].is_none() || labels[idx] != Label::Unvisited {
            continue;
        }

        let seeds = neighbours(idx);
        if seeds.len() < min_samples {
            labels[idx] = Label::Noise;
            continue;
        }

        let cluster_id = cluster_count;
        cluster_count += 1;
        labels[idx] = Label::Cluster(cluster_id);

        let mut queue: VecDeque<usize> = seeds.into_iter().filter(|&j| j != idx).collect();
        while let Some(j) = queue.pop_front() {
            match labels[j] {
                Label::Noise => {
                    // Border point, reachable but not expanding.
                    labels[j] = Label::Cluster(cluster_id);
                    continue;
                }
                Label::Cluster(_) => continue,
                Label::Unvisited => {}
            }

            labels[j] = Label::Cluster(cluster_id);
            let expansion = neighbours(j);
            if expansion.len() >= min_samples {
                queue.extend(
                    expansion
                        .into_iter()
                        .filter(|&k| matches!(labels[k], Label::Unvisited | Label::Noise)),
                );
            }
        }
    }

    let mut result = DbscanResult {
        clusters: vec![Vec::new(); cluster_count],
        noise: Vec::new(),
    };
    for (idx, label) in labels.into_iter().enumerate() {
        match label {
            Label::Cluster(c) => result.clusters[c].push(idx),
            Label::Noise => result.noise.push(idx),
            Label::Unvisited => {}
        }
    }

    result
}
