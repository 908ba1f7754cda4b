use crate::db_types::{Category, City, DeviceType};

/// Baseline risk weight (0-1) for a request originating in the given city. The table is closed over the `City` enum,
/// so an unlisted city can only ever be `Unknown`.
pub fn city_risk(city: City) -> f64 {
    match city {
        City::Mumbai => 0.10,
        City::Delhi => 0.15,
        City::Bangalore => 0.10,
        City::Hyderabad => 0.15,
        City::Chennai => 0.15,
        City::Kolkata => 0.20,
        City::Pune => 0.15,
        City::Ahmedabad => 0.20,
        City::Unknown => 0.90,
    }
}

/// Risk weight (0-1) per device class.
pub fn device_risk(device: DeviceType) -> f64 {
    match device {
        DeviceType::Mobile => 0.20,
        DeviceType::Desktop => 0.30,
        DeviceType::Tablet => 0.40,
        DeviceType::Unknown => 0.80,
    }
}

/// Risk weight (0-1) per merchant category. Luxury categories carry the highest weight.
pub fn category_risk(category: Category) -> f64 {
    match category {
        Category::Electronics => 0.60,
        Category::Jewellery => 0.70,
        Category::Travel => 0.40,
        Category::Fashion => 0.30,
        Category::Beauty => 0.30,
        Category::Home => 0.25,
        Category::Food => 0.15,
        Category::Grocery => 0.10,
        Category::Fuel => 0.15,
        Category::Pharmacy => 0.15,
        Category::Other => 0.50,
    }
}
