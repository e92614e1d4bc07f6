use offline_tile_downloader::{Fixture, LAT_LIMIT};

pub fn latitude(v: &str) -> Result<f64, String> {
    let val = v.parse::<f64>().map_err(|_| "must be numeric".to_owned())?;

    if val.is_nan() || val.abs() >= LAT_LIMIT {
        return Err(format!("must lie within ±{}°", LAT_LIMIT));
    }

    Ok(val)
}

pub fn longitude(v: &str) -> Result<f64, String> {
    let val = v.parse::<f64>().map_err(|_| "must be numeric".to_owned())?;

    if val < -180f64 {
        return Err("must be >= -180°".to_owned());
    } else if val > 180f64 {
        return Err("must be <= 180°".to_owned());
    }

    Ok(val)
}

pub fn fixture(v: &str) -> Result<Fixture, String> {
    v.parse::<Fixture>()
        .map_err(|_| "invalid fixture, expected one of: village, usa, aachen".to_owned())
}
