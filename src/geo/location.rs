use async_trait::async_trait;
use tracing::{debug, warn};

use super::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Parts returned by reverse geocoding; any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeocodedAddress {
    pub street_number: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
}

impl GeocodedAddress {
    /// "12 Main St, Springfield, IL" with absent parts left out.
    pub fn format(&self) -> String {
        let mut out = String::new();
        if let Some(n) = &self.street_number {
            out.push_str(n);
            out.push(' ');
        }
        if let Some(s) = &self.street {
            out.push_str(s);
            out.push_str(", ");
        }
        if let Some(c) = &self.city {
            out.push_str(c);
            out.push_str(", ");
        }
        if let Some(r) = &self.region {
            out.push_str(r);
        }
        out
    }
}

/// Device position source.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn request_permission(&self) -> Permission;
    async fn current_position(&self) -> anyhow::Result<Location>;
    async fn reverse_geocode(&self, location: &Location) -> anyhow::Result<Option<GeocodedAddress>>;
}

/// Resolve the device location, degrading to `None` instead of failing.
pub async fn locate(provider: &dyn LocationProvider) -> Option<Location> {
    if provider.request_permission().await != Permission::Granted {
        debug!("location permission denied");
        return None;
    }

    let mut location = match provider.current_position().await {
        Ok(l) => l,
        Err(e) => {
            warn!(error = %e, "getting location failed");
            return None;
        }
    };

    match provider.reverse_geocode(&location).await {
        Ok(Some(parts)) => location.address = Some(parts.format()),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "reverse geocoding failed"),
    }
    Some(location)
}

/// Always answers with the same position. Stands in for GPS on the web build.
#[derive(Debug, Clone)]
pub struct FixedLocation(pub Location);

impl FixedLocation {
    pub fn san_francisco() -> Self {
        Self(Location::new(37.7749, -122.4194).with_address("San Francisco, CA"))
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    async fn current_position(&self) -> anyhow::Result<Location> {
        Ok(self.0.clone())
    }

    async fn reverse_geocode(&self, _location: &Location) -> anyhow::Result<Option<GeocodedAddress>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Device {
        permission: Permission,
        position: Option<Location>,
        geocode: Result<Option<GeocodedAddress>, &'static str>,
    }

    #[async_trait]
    impl LocationProvider for Device {
        async fn request_permission(&self) -> Permission {
            self.permission
        }

        async fn current_position(&self) -> anyhow::Result<Location> {
            self.position.clone().ok_or_else(|| anyhow::anyhow!("no fix"))
        }

        async fn reverse_geocode(&self, _l: &Location) -> anyhow::Result<Option<GeocodedAddress>> {
            self.geocode.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn full_address() -> GeocodedAddress {
        GeocodedAddress {
            street_number: Some("123".into()),
            street: Some("Market St".into()),
            city: Some("San Francisco".into()),
            region: Some("CA".into()),
        }
    }

    #[test]
    fn formats_address_parts() {
        assert_eq!(full_address().format(), "123 Market St, San Francisco, CA");
        let partial = GeocodedAddress {
            city: Some("Oakland".into()),
            region: Some("CA".into()),
            ..Default::default()
        };
        assert_eq!(partial.format(), "Oakland, CA");
    }

    #[tokio::test]
    async fn denied_permission_yields_none() {
        let device = Device {
            permission: Permission::Denied,
            position: Some(Location::new(1.0, 2.0)),
            geocode: Ok(None),
        };
        assert!(locate(&device).await.is_none());
    }

    #[tokio::test]
    async fn position_failure_yields_none() {
        let device = Device {
            permission: Permission::Granted,
            position: None,
            geocode: Ok(None),
        };
        assert!(locate(&device).await.is_none());
    }

    #[tokio::test]
    async fn geocode_failure_keeps_coordinates() {
        let device = Device {
            permission: Permission::Granted,
            position: Some(Location::new(1.0, 2.0)),
            geocode: Err("offline"),
        };
        let loc = locate(&device).await.unwrap();
        assert_eq!(loc, Location::new(1.0, 2.0));
    }

    #[tokio::test]
    async fn address_is_attached() {
        let device = Device {
            permission: Permission::Granted,
            position: Some(Location::new(37.7749, -122.4194)),
            geocode: Ok(Some(full_address())),
        };
        let loc = locate(&device).await.unwrap();
        assert_eq!(loc.address.as_deref(), Some("123 Market St, San Francisco, CA"));
    }

    #[tokio::test]
    async fn fixed_location_is_san_francisco() {
        let loc = locate(&FixedLocation::san_francisco()).await.unwrap();
        assert_eq!(loc.latitude, 37.7749);
        assert_eq!(loc.address.as_deref(), Some("San Francisco, CA"));
    }
}
