use serde::Serialize;

use crate::dataset::DatasetId;
use crate::domain::{DengueCluster, GeoPoint, Geometry};
use crate::envelope::Envelope;
use crate::query::{top_n, Order, Scored};
use crate::services::{query, Pipeline};
use crate::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DengueCount {
    pub clusters: usize,
    /// Sum of reported case sizes; `None` when no cluster reports one.
    pub total_cases: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterCoordinates {
    pub locality: String,
    pub centroid: Option<GeoPoint>,
    pub geometry: Option<Geometry>,
}

/// Active dengue clusters published by NEA.
#[derive(Debug, Clone, Copy)]
pub struct DengueService<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> DengueService<'a> {
    pub(crate) fn new(pipeline: &'a Pipeline) -> Self {
        Self { pipeline }
    }

    pub async fn count(&self) -> Result<Envelope<DengueCount>, SourceError> {
        self.run(|clusters| {
            let total_cases = clusters
                .iter()
                .filter_map(|cluster| cluster.case_size)
                .fold(None, |total: Option<u64>, cases| Some(total.unwrap_or(0) + u64::from(cases)));
            Ok(DengueCount {
                clusters: clusters.len(),
                total_cases,
            })
        })
        .await
    }

    pub async fn locations(&self) -> Result<Envelope<Vec<DengueCluster>>, SourceError> {
        self.run(|clusters| Ok(clusters.to_vec())).await
    }

    pub async fn coordinates(&self) -> Result<Envelope<Vec<ClusterCoordinates>>, SourceError> {
        self.run(|clusters| {
            Ok(clusters
                .iter()
                .map(|cluster| ClusterCoordinates {
                    locality: cluster.locality.to_string(),
                    centroid: cluster.centroid(),
                    geometry: cluster.geometry.clone(),
                })
                .collect())
        })
        .await
    }

    /// Clusters with the most cases; clusters without a case count are left out.
    pub async fn largest_clusters(
        &self,
        limit: usize,
    ) -> Result<Envelope<Vec<Scored<DengueCluster>>>, SourceError> {
        self.run(|clusters| {
            Ok(top_n(clusters, "case_size", Order::Descending, limit)?
                .iter()
                .map(|entry| entry.to_scored())
                .collect())
        })
        .await
    }

    async fn run<T>(
        &self,
        run: impl FnOnce(&[DengueCluster]) -> Result<T, SourceError>,
    ) -> Result<Envelope<T>, SourceError> {
        query(self.pipeline, DatasetId::DengueClusters, run).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::http_client::FixtureHttpClient;
    use crate::services::testing::{pipeline, realtime};

    fn client() -> FixtureHttpClient {
        FixtureHttpClient::new()
            .respond_json("poll-download", &realtime(json!({"url": "https://s3.test/dengue.geojson"})))
            .respond_json(
                "dengue.geojson",
                &json!({
                    "type": "FeatureCollection",
                    "features": [
                        {"type": "Feature",
                         "properties": {"LOCALITY": "Ang Mo Kio Ave 10", "CASE_SIZE": 12},
                         "geometry": {"type": "Polygon", "coordinates": [[
                             [103.85, 1.36], [103.86, 1.36], [103.86, 1.37], [103.85, 1.37], [103.85, 1.36]
                         ]]}},
                        {"type": "Feature",
                         "properties": {"LOCALITY": "Bedok North St 1", "CASE_SIZE": "30"},
                         "geometry": {"type": "Point", "coordinates": [103.93, 1.33]}},
                        {"type": "Feature",
                         "properties": {"LOCALITY": "Tampines St 21"},
                         "geometry": null}
                    ]
                }),
            )
    }

    #[tokio::test]
    async fn counts_and_rankings_skip_unreported_cases() {
        let client = client();
        let pipeline = pipeline(&client);
        let dengue = pipeline.dengue();

        let count = dengue.count().await.expect("query").data;
        assert_eq!(count, DengueCount { clusters: 3, total_cases: Some(42) });

        let largest = dengue.largest_clusters(5).await.expect("query").data;
        let localities: Vec<&str> = largest.iter().map(|entry| entry.record.locality.as_str()).collect();
        assert_eq!(localities, vec!["Bedok North St 1", "Ang Mo Kio Ave 10"]);

        assert_eq!(client.request_count("poll-download"), 1);
    }

    #[tokio::test]
    async fn coordinates_carry_a_centroid_per_cluster() {
        let client = client();
        let pipeline = pipeline(&client);

        let coordinates = pipeline.dengue().coordinates().await.expect("query").data;
        let centroid = coordinates[0].centroid.expect("polygon centroid");
        assert!((centroid.latitude - 1.365).abs() < 1e-9);
        assert!((centroid.longitude - 103.855).abs() < 1e-9);
        assert_eq!(coordinates[1].centroid, Some(GeoPoint::new(1.33, 103.93)));
        assert_eq!(coordinates[2].centroid, None);
    }
}
