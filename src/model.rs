use std::collections::BTreeMap;
use std::fmt;

use clap::ValueEnum;

/// Sentinel description for entities that carry none of the describable tags.
pub const DEFAULT_DESCRIPTION: &str = "OSM Point of Interest";

/// Flat key/value attributes of one entity. Built up while the entity's
/// attribute block is being read, then never mutated.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.0.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|value| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Non-empty-presence test.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).map(|value| !value.is_empty()).unwrap_or(false)
    }

    /// Exact-membership test against a fixed value set.
    pub fn value_in(&self, key: &str, values: &[&str]) -> bool {
        self.get(key)
            .map(|value| values.contains(&value))
            .unwrap_or(false)
    }

}

impl FromIterator<(String, String)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One raw node read from a source file, before filtering and
/// categorization. Entities without an id or a full coordinate never
/// materialize.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntity {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub tags: TagSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Restaurant,
    Hotel,
    Hospital,
    Transportation,
    GasStation,
    Shopping,
    Recreation,
    Education,
    Tourism,
    Services,
    Other,
}

impl Category {
    /// Wire label, as written to the CSV.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Restaurant => "restaurant",
            Category::Hotel => "hotel",
            Category::Hospital => "hospital",
            Category::Transportation => "transportation",
            Category::GasStation => "gas_station",
            Category::Shopping => "shopping",
            Category::Recreation => "recreation",
            Category::Education => "education",
            Category::Tourism => "tourism",
            Category::Services => "services",
            Category::Other => "other",
        }
    }

    /// Human label used when synthesizing a name for an unnamed entity.
    pub fn title(&self) -> &'static str {
        match self {
            Category::Restaurant => "Restaurant",
            Category::Hotel => "Hotel",
            Category::Hospital => "Hospital",
            Category::Transportation => "Transportation",
            Category::GasStation => "Gas Station",
            Category::Shopping => "Shopping",
            Category::Recreation => "Recreation",
            Category::Education => "Education",
            Category::Tourism => "Tourism",
            Category::Services => "Services",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How strictly entities are admitted to the output.
///
/// `Strict` keeps only entities with a non-empty `name` tag and a matching
/// classification rule. `Lenient` keeps named entities even without a
/// matching rule (categorized `other`) and unnamed entities that do match a
/// rule (named `Unknown <Category>`). The discrepancy is deliberate; both
/// behaviors exist in the field and callers pick one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Strict,
    Lenient,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Strict => "strict",
            Mode::Lenient => "lenient",
        })
    }
}

/// Classifies an entity from its tags. The rules form an ordered chain and
/// the first match wins; the order is part of the contract. Note that
/// `amenity=fuel` is claimed by the transportation rule before the
/// gas_station rule is ever reached, so gas_station only matches
/// `charging_station`.
pub fn categorize(tags: &TagSet) -> Option<Category> {
    if tags.value_in(
        "amenity",
        &["restaurant", "cafe", "fast_food", "bar", "pub", "food_court", "biergarten"],
    ) {
        Some(Category::Restaurant)
    } else if tags.value_in("amenity", &["hotel", "guest_house", "hostel", "motel"])
        || tags.value_in("tourism", &["hotel", "hostel", "guest_house", "motel"])
    {
        Some(Category::Hotel)
    } else if tags.value_in(
        "amenity",
        &["hospital", "clinic", "pharmacy", "dentist", "doctors", "veterinary"],
    ) || tags.has("healthcare")
    {
        Some(Category::Hospital)
    } else if tags.value_in("amenity", &["bus_station", "taxi", "fuel", "ferry_terminal"])
        || tags.value_in("railway", &["station", "halt", "tram_stop"])
        || tags.value_in("aeroway", &["aerodrome", "helipad"])
        || tags.value_in("highway", &["bus_stop"])
    {
        Some(Category::Transportation)
    } else if tags.value_in("amenity", &["fuel", "charging_station"]) {
        Some(Category::GasStation)
    } else if tags.has("shop") || tags.value_in("amenity", &["marketplace", "shopping_centre"]) {
        Some(Category::Shopping)
    } else if tags.value_in(
        "leisure",
        &["park", "playground", "sports_centre", "stadium", "swimming_pool", "golf_course"],
    ) || tags.value_in("amenity", &["theatre", "cinema", "arts_centre"])
        || tags.value_in("tourism", &["zoo", "theme_park"])
    {
        Some(Category::Recreation)
    } else if tags.value_in(
        "amenity",
        &["school", "university", "college", "kindergarten", "library"],
    ) {
        Some(Category::Education)
    } else if tags.value_in(
        "tourism",
        &["attraction", "museum", "monument", "viewpoint", "gallery", "information"],
    ) || tags.value_in("amenity", &["place_of_worship"])
        || tags.has("historic")
    {
        Some(Category::Tourism)
    } else if tags.value_in(
        "amenity",
        &["bank", "atm", "post_office", "police", "fire_station", "courthouse", "townhall"],
    ) {
        Some(Category::Services)
    } else {
        None
    }
}

const DESCRIBED_TAGS: [(&str, &str); 6] = [
    ("amenity", "Amenity"),
    ("shop", "Shop"),
    ("tourism", "Tourism"),
    ("addr:street", "Street"),
    ("addr:city", "City"),
    ("cuisine", "Cuisine"),
];

/// Builds the human-readable description from the tags, labeled fields in a
/// fixed order with the free-text `description` tag appended last.
pub fn describe(tags: &TagSet) -> String {
    let mut parts = Vec::new();
    for (key, label) in DESCRIBED_TAGS {
        if let Some(value) = tags.get(key) {
            if !value.is_empty() {
                parts.push(format!("{label}: {value}"));
            }
        }
    }
    if let Some(value) = tags.get("description") {
        if !value.is_empty() {
            parts.push(value.to_string());
        }
    }

    if parts.is_empty() {
        DEFAULT_DESCRIPTION.to_string()
    } else {
        parts.join("; ")
    }
}

/// Optional rectangular extraction window, inclusive on all edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.min_lat <= lat && lat <= self.max_lat && self.min_lng <= lon && lon <= self.max_lng
    }
}

pub fn valid_coordinate(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// Spatial filter: valid global range always, box containment when given.
pub fn accepts(lat: f64, lon: f64, bounds: Option<&BoundingBox>) -> bool {
    valid_coordinate(lat, lon) && bounds.map_or(true, |bbox| bbox.contains(lat, lon))
}

/// One finished output record. Created by the extraction driver, owned by
/// the aggregator until serialization, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct PoiRecord {
    pub name: String,
    pub category: Category,
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
}
