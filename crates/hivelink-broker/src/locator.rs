//! Cluster identifier classification and lookup.

use std::fmt;

use hivelink_config::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::backend::{ClusterRecord, ClusterSearch};
use crate::connection::Connection;
use crate::error::{BrokerError, Result};

static INTERNAL_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-z]{32}$").unwrap_or_else(|_| unreachable!()));

static EXTERNAL_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap_or_else(|_| unreachable!())
});

/// The shape of a user-supplied cluster identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterIdentifierQuery {
    /// 32 lowercase alphanumerics, matched exactly against the internal ID.
    InternalId(String),
    /// A hyphenated UUID, matched exactly against the external ID.
    ExternalId(String),
    /// Anything else, matched as a display-name substring.
    DisplayNamePattern(String),
}

impl ClusterIdentifierQuery {
    /// Classifies an identifier. Every string maps to exactly one variant.
    #[must_use]
    pub fn classify(identifier: &str) -> Self {
        if INTERNAL_ID_REGEX.is_match(identifier) {
            Self::InternalId(identifier.to_string())
        } else if EXTERNAL_ID_REGEX.is_match(identifier) {
            Self::ExternalId(identifier.to_string())
        } else {
            Self::DisplayNamePattern(identifier.to_string())
        }
    }

    /// The search this query issues.
    #[must_use]
    pub fn to_search(&self) -> ClusterSearch {
        match self {
            Self::InternalId(id) => ClusterSearch::InternalId(id.clone()),
            Self::ExternalId(id) => ClusterSearch::ExternalId(id.clone()),
            Self::DisplayNamePattern(name) => ClusterSearch::DisplayNameContains(name.clone()),
        }
    }

    /// The identifier as given.
    #[must_use]
    pub fn identifier(&self) -> &str {
        match self {
            Self::InternalId(s) | Self::ExternalId(s) | Self::DisplayNamePattern(s) => s,
        }
    }
}

impl fmt::Display for ClusterIdentifierQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InternalId(id) => write!(f, "internal id '{id}'"),
            Self::ExternalId(id) => write!(f, "external id '{id}'"),
            Self::DisplayNamePattern(name) => write!(f, "display name like '{name}'"),
        }
    }
}

/// Resolves identifiers to cluster records through a connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterLocator;

impl ClusterLocator {
    /// Resolves `identifier` to exactly one cluster.
    ///
    /// Issues a single query that matches clusters in any lifecycle state.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` for a blank identifier, without querying
    /// - `ClusterNotFound` on zero matches
    /// - `AmbiguousCluster` on more than one match
    pub async fn locate(connection: &Connection, identifier: &str) -> Result<ClusterRecord> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ConfigError::invalid_config("cluster identifier is empty").into());
        }
        let query = ClusterIdentifierQuery::classify(identifier);
        Self::locate_query(connection, &query).await
    }

    /// Resolves an already classified query.
    ///
    /// # Errors
    ///
    /// As [`ClusterLocator::locate`].
    pub async fn locate_query(
        connection: &Connection,
        query: &ClusterIdentifierQuery,
    ) -> Result<ClusterRecord> {
        let search = query.to_search();
        debug!(%query, search = %search.to_search_string(), "searching clusters");
        let mut matches = connection.session().search_clusters(&search).await?;

        match matches.len() {
            0 => Err(BrokerError::cluster_not_found(query.identifier())),
            1 => {
                let cluster = matches.remove(0);
                info!(
                    cluster_id = cluster.internal_id(),
                    name = cluster.display_name(),
                    state = %cluster.state(),
                    "located cluster"
                );
                Ok(cluster)
            }
            count => Err(BrokerError::AmbiguousCluster {
                identifier: query.identifier().to_string(),
                count,
                candidates: matches
                    .iter()
                    .map(|c| format!("{} ({})", c.display_name(), c.internal_id()))
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ClusterState;
    use crate::connection::ConnectionBuilder;
    use crate::fake::FakeControlPlane;
    use hivelink_config::Endpoint;
    use proptest::prelude::*;
    use test_case::test_case;

    const URL: &str = "https://api.openshift.com";
    const INTERNAL: &str = "261kalm3uob0vegg1c7h9o7r5k9t64ji";
    const EXTERNAL: &str = "c1f562af-fb22-42c5-aa07-6848e1eeee9c";

    #[test_case(INTERNAL, ClusterIdentifierQuery::InternalId(INTERNAL.into()) ; "internal id")]
    #[test_case(EXTERNAL, ClusterIdentifierQuery::ExternalId(EXTERNAL.into()) ; "external id")]
    #[test_case("hs-mc-773jpgko0", ClusterIdentifierQuery::DisplayNamePattern("hs-mc-773jpgko0".into()) ; "display name")]
    #[test_case("261kalm3uob0vegg1c7h9o7r5k9t64j", ClusterIdentifierQuery::DisplayNamePattern("261kalm3uob0vegg1c7h9o7r5k9t64j".into()) ; "31 chars")]
    #[test_case("261kalm3uob0vegg1c7h9o7r5k9t64jix", ClusterIdentifierQuery::DisplayNamePattern("261kalm3uob0vegg1c7h9o7r5k9t64jix".into()) ; "33 chars")]
    #[test_case("261KALM3UOB0VEGG1C7H9O7R5K9T64JI", ClusterIdentifierQuery::DisplayNamePattern("261KALM3UOB0VEGG1C7H9O7R5K9T64JI".into()) ; "uppercase 32 chars")]
    #[test_case("C1F562AF-FB22-42C5-AA07-6848E1EEEE9C", ClusterIdentifierQuery::ExternalId("C1F562AF-FB22-42C5-AA07-6848E1EEEE9C".into()) ; "uppercase uuid")]
    #[test_case("c1f562af-fb22-42c5-aa07-6848e1eeee9", ClusterIdentifierQuery::DisplayNamePattern("c1f562af-fb22-42c5-aa07-6848e1eeee9".into()) ; "short uuid")]
    fn test_classify(identifier: &str, expected: ClusterIdentifierQuery) {
        assert_eq!(ClusterIdentifierQuery::classify(identifier), expected);
    }

    proptest! {
        #[test]
        fn classify_is_total_and_preserves_input(identifier in ".*") {
            let query = ClusterIdentifierQuery::classify(&identifier);
            prop_assert_eq!(query.identifier(), identifier.as_str());
        }

        #[test]
        fn classify_is_deterministic(identifier in "[0-9a-z-]{0,40}") {
            prop_assert_eq!(
                ClusterIdentifierQuery::classify(&identifier),
                ClusterIdentifierQuery::classify(&identifier)
            );
        }

        #[test]
        fn every_32_char_lower_alnum_is_internal(identifier in "[0-9a-z]{32}") {
            prop_assert!(matches!(
                ClusterIdentifierQuery::classify(&identifier),
                ClusterIdentifierQuery::InternalId(_)
            ));
        }
    }

    fn fake() -> FakeControlPlane {
        FakeControlPlane::new()
            .with_cluster(
                URL,
                ClusterRecord::new(INTERNAL, "hs-mc-773jpgko0", ClusterState::Installing)
                    .with_external_id(EXTERNAL),
            )
            .with_cluster(
                URL,
                ClusterRecord::new("0123456789abcdefghijklmnopqrstuv", "hs-mc-other", ClusterState::Ready),
            )
    }

    async fn connect(fake: &FakeControlPlane) -> Connection {
        ConnectionBuilder::new(fake)
            .open(Endpoint::new(URL).with_access_token("t"))
            .await
            .expect("should open")
    }

    #[tokio::test]
    async fn test_locate_by_each_shape() {
        let fake = fake();
        let connection = connect(&fake).await;

        for identifier in [INTERNAL, EXTERNAL, "773jpgko0"] {
            let cluster = ClusterLocator::locate(&connection, identifier).await.expect("found");
            assert_eq!(cluster.internal_id(), INTERNAL);
        }
        assert_eq!(fake.search_calls().len(), 3);
        assert_eq!(fake.search_calls()[0], ClusterSearch::InternalId(INTERNAL.into()));
    }

    #[tokio::test]
    async fn test_locate_finds_non_ready_clusters() {
        let fake = fake();
        let connection = connect(&fake).await;
        let cluster = ClusterLocator::locate(&connection, INTERNAL).await.expect("found");
        assert_eq!(cluster.state(), &ClusterState::Installing);
    }

    #[tokio::test]
    async fn test_locate_not_found() {
        let fake = fake();
        let connection = connect(&fake).await;
        let err = ClusterLocator::locate(&connection, "nothing-like-this").await.unwrap_err();
        assert!(matches!(err, BrokerError::ClusterNotFound { ref identifier } if identifier == "nothing-like-this"));
    }

    #[tokio::test]
    async fn test_locate_ambiguous_lists_candidates() {
        let fake = fake();
        let connection = connect(&fake).await;
        let err = ClusterLocator::locate(&connection, "hs-mc").await.unwrap_err();
        match err {
            BrokerError::AmbiguousCluster { count, candidates, .. } => {
                assert_eq!(count, 2);
                assert!(candidates.contains("hs-mc-other"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_locate_blank_identifier_makes_no_query() {
        let fake = fake();
        let connection = connect(&fake).await;
        let err = ClusterLocator::locate(&connection, "   ").await.unwrap_err();
        assert!(matches!(err, BrokerError::Config(ConfigError::InvalidConfig { .. })));
        assert!(fake.search_calls().is_empty());
    }
}
