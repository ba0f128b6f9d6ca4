// Geographic value types and bounding-box arithmetic.

/// A latitude/longitude pair in degrees. No range is enforced by the type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn from_pair([lat, lng]: [f64; 2]) -> Self {
        Self { lat, lng }
    }

    pub fn to_pair(self) -> [f64; 2] {
        [self.lat, self.lng]
    }

    /// Rounds both components to 4 decimal places (~11 m at the equator).
    pub fn rounded(self) -> Self {
        Self {
            lat: round4(self.lat),
            lng: round4(self.lng),
        }
    }
}

/// Inclusive axis-aligned box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

/// Continental US.
pub const US_BOUNDS: Bounds = Bounds {
    min_lat: 25.0,
    max_lat: 49.0,
    min_lng: -125.0,
    max_lng: -66.0,
};

impl Bounds {
    pub fn contains_lat(&self, lat: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat)
    }

    pub fn contains_lng(&self, lng: f64) -> bool {
        (self.min_lng..=self.max_lng).contains(&lng)
    }

    pub fn contains(&self, position: LatLng) -> bool {
        self.contains_lat(position.lat) && self.contains_lng(position.lng)
    }

    pub fn clamp_lat(&self, lat: f64) -> f64 {
        lat.clamp(self.min_lat, self.max_lat)
    }

    pub fn clamp_lng(&self, lng: f64) -> f64 {
        lng.clamp(self.min_lng, self.max_lng)
    }
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
