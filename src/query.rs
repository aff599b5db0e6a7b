//! Query layer over the file-backed cache: filtering, pagination, and
//! lookup-by-id for the HTTP route layer and the broadcast engine.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::cache::{units, DataCache, CORE_UNITS};
use crate::error::DataError;
use crate::model::{RiskLevel, Threat, ThreatStatus, UnitData, Vendor};

/// Optional, conjunctive filters over the threat collection. Pagination is
/// applied after filtering, in source order.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ThreatFilter {
    /// Inclusive lower bound on severity.
    pub min_severity: Option<u8>,
    /// Case-sensitive substring match on the vendor name.
    pub vendor: Option<String>,
    pub status: Option<ThreatStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct VendorFilter {
    pub risk_level: Option<RiskLevel>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Read interface over the cached collections. Cheap to clone; all clones
/// share the underlying cache.
#[derive(Clone)]
pub struct QueryService {
    cache: Arc<DataCache>,
}

impl QueryService {
    pub fn new(cache: Arc<DataCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &DataCache {
        &self.cache
    }

    pub async fn get_threats(&self, filter: &ThreatFilter) -> Result<Vec<Threat>, DataError> {
        let data = self.cache.load(units::THREATS).await?;
        let UnitData::Threats(all) = data.as_ref() else {
            return Ok(Vec::new());
        };
        Ok(paginate(
            all.iter().filter(|t| filter.matches(t)).cloned(),
            filter.offset,
            filter.limit,
        ))
    }

    pub async fn get_threat_by_id(&self, id: &str) -> Result<Threat, DataError> {
        let data = self.cache.load(units::THREATS).await?;
        let UnitData::Threats(all) = data.as_ref() else {
            return Err(DataError::RecordNotFound { id: id.to_string() });
        };
        all.iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| DataError::RecordNotFound { id: id.to_string() })
    }

    pub async fn get_vendors(&self, filter: &VendorFilter) -> Result<Vec<Vendor>, DataError> {
        let data = self.cache.load(units::VENDORS).await?;
        let UnitData::Vendors(all) = data.as_ref() else {
            return Ok(Vec::new());
        };
        Ok(paginate(
            all.iter()
                .filter(|v| filter.risk_level.map_or(true, |level| v.risk_level == level))
                .cloned(),
            filter.offset,
            filter.limit,
        ))
    }

    pub async fn get_vendor_by_id(&self, id: &str) -> Result<Vendor, DataError> {
        let data = self.cache.load(units::VENDORS).await?;
        let UnitData::Vendors(all) = data.as_ref() else {
            return Err(DataError::RecordNotFound { id: id.to_string() });
        };
        all.iter()
            .find(|v| v.id == id)
            .cloned()
            .ok_or_else(|| DataError::RecordNotFound { id: id.to_string() })
    }

    /// Cached dashboard summary, returned verbatim.
    pub async fn get_dashboard_overview(&self) -> Result<Value, DataError> {
        self.get_document(units::DASHBOARD).await
    }

    /// Cached analytics structure, returned verbatim.
    pub async fn get_analytics(&self) -> Result<Value, DataError> {
        self.get_document(units::ANALYTICS).await
    }

    async fn get_document(&self, unit: &str) -> Result<Value, DataError> {
        let data = self.cache.load(unit).await?;
        match data.as_ref() {
            UnitData::Document(doc) => Ok(doc.clone()),
            _ => Ok(Value::Null),
        }
    }

    /// Drop the cache and eagerly re-warm the core set. Reload failures are
    /// logged and swallowed: a stale cache beats a hard failure on a manual
    /// refresh, and the failed unit retries lazily on its next read.
    pub async fn refresh_data(&self) {
        self.cache.refresh().await;
        for unit in CORE_UNITS {
            if let Err(e) = self.cache.load(unit).await {
                warn!(unit, error = %e, "reload after refresh failed");
            }
        }
    }
}

impl ThreatFilter {
    fn matches(&self, threat: &Threat) -> bool {
        self.min_severity.map_or(true, |min| threat.severity >= min)
            && self
                .vendor
                .as_ref()
                .map_or(true, |needle| threat.vendor_name.contains(needle.as_str()))
            && self.status.map_or(true, |status| threat.status == status)
    }
}

fn paginate<T>(items: impl Iterator<Item = T>, offset: Option<usize>, limit: Option<usize>) -> Vec<T> {
    items
        .skip(offset.unwrap_or(0))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fixtures::data_dir;

    fn service(dir: &std::path::Path) -> QueryService {
        QueryService::new(Arc::new(DataCache::new(dir)))
    }

    #[tokio::test]
    async fn unfiltered_threats_preserve_source_order() {
        let dir = data_dir();
        let threats = service(&dir)
            .get_threats(&ThreatFilter::default())
            .await
            .unwrap();
        let ids: Vec<_> = threats.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["THR-001", "THR-002", "THR-003"]);
    }

    #[tokio::test]
    async fn min_severity_is_inclusive() {
        let dir = data_dir();
        let filter = ThreatFilter {
            min_severity: Some(7),
            ..Default::default()
        };
        let threats = service(&dir).get_threats(&filter).await.unwrap();
        assert_eq!(threats.len(), 2);
        assert!(threats.iter().all(|t| t.severity >= 7));
    }

    #[tokio::test]
    async fn filters_are_conjunctive() {
        let dir = data_dir();
        let filter = ThreatFilter {
            min_severity: Some(5),
            vendor: Some("CloudVendor".to_string()),
            status: Some(ThreatStatus::Active),
            ..Default::default()
        };
        let threats = service(&dir).get_threats(&filter).await.unwrap();
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].id, "THR-001");
    }

    #[tokio::test]
    async fn vendor_match_is_case_sensitive_substring() {
        let dir = data_dir();
        let svc = service(&dir);

        let lower = ThreatFilter {
            vendor: Some("cloudvendor".to_string()),
            ..Default::default()
        };
        assert!(svc.get_threats(&lower).await.unwrap().is_empty());

        let exact = ThreatFilter {
            vendor: Some("Cloud".to_string()),
            ..Default::default()
        };
        assert_eq!(svc.get_threats(&exact).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn pagination_applies_after_filtering() {
        let dir = data_dir();
        let filter = ThreatFilter {
            limit: Some(2),
            offset: Some(1),
            ..Default::default()
        };
        let threats = service(&dir).get_threats(&filter).await.unwrap();
        let ids: Vec<_> = threats.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["THR-002", "THR-003"]);
    }

    #[tokio::test]
    async fn no_match_is_empty_not_error() {
        let dir = data_dir();
        let filter = ThreatFilter {
            min_severity: Some(10),
            ..Default::default()
        };
        assert!(service(&dir).get_threats(&filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lookup_by_id() {
        let dir = data_dir();
        let svc = service(&dir);

        let threat = svc.get_threat_by_id("THR-002").await.unwrap();
        assert_eq!(threat.vendor_name, "SecureNet Inc");

        let err = svc.get_threat_by_id("THR-999").await.unwrap_err();
        assert!(matches!(err, DataError::RecordNotFound { ref id } if id == "THR-999"));

        let vendor = svc.get_vendor_by_id("VEN-001").await.unwrap();
        assert_eq!(vendor.name, "CloudVendor Solutions");
    }

    #[tokio::test]
    async fn vendors_filter_by_risk_level() {
        let dir = data_dir();
        let filter = VendorFilter {
            risk_level: Some(RiskLevel::High),
            ..Default::default()
        };
        let vendors = service(&dir).get_vendors(&filter).await.unwrap();
        assert_eq!(vendors.len(), 1);
        assert_eq!(vendors[0].id, "VEN-001");
    }

    #[tokio::test]
    async fn documents_are_served_verbatim() {
        let dir = data_dir();
        let svc = service(&dir);
        let overview = svc.get_dashboard_overview().await.unwrap();
        assert_eq!(overview["vendors_monitored"], 2);
        let analytics = svc.get_analytics().await.unwrap();
        assert_eq!(analytics["trend"], "rising");
    }

    #[tokio::test]
    async fn refresh_data_rewarms_core_units() {
        let dir = data_dir();
        let svc = service(&dir);
        svc.cache().initialize().await.unwrap();

        std::fs::write(
            dir.join("threats.json"),
            r#"[{"id": "THR-NEW", "vendor_name": "SecureNet Inc", "threat_type": "malware",
                 "severity": 5, "ai_risk_score": 5.0, "status": "active",
                 "detected_at": "2026-08-10T00:00:00Z", "description": "fresh"}]"#,
        )
        .unwrap();
        svc.refresh_data().await;

        // Cache is warm again and serving the new generation.
        assert_eq!(svc.cache().stats().await.entries, 4);
        let threats = svc.get_threats(&ThreatFilter::default()).await.unwrap();
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].id, "THR-NEW");
    }

    #[tokio::test]
    async fn refresh_data_swallows_reload_failures() {
        let dir = data_dir();
        let svc = service(&dir);
        svc.cache().initialize().await.unwrap();

        std::fs::remove_file(dir.join("analytics.json")).unwrap();
        // Must not panic or propagate; the other units are re-warmed.
        svc.refresh_data().await;
        assert_eq!(svc.cache().stats().await.entries, 3);
    }
}
