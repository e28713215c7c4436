use chrono::{DateTime, Local, TimeZone};

/// Remote file name for a capture taken at `at`, e.g. `IMG07022019-154501.jpg`
pub fn image_name<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("IMG{}.jpg", at.format("%d%m%Y-%H%M%S"))
}

pub fn image_name_now() -> String {
    image_name(&Local::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    #[test]
    fn test_image_name_format() {
        let at = NaiveDate::from_ymd_opt(2019, 2, 7)
            .unwrap()
            .and_hms_opt(15, 45, 1)
            .unwrap()
            .and_utc();

        assert_eq!(image_name(&at), "IMG07022019-154501.jpg");
    }

    #[test]
    fn test_image_name_year_at_boundary() {
        // Calendar year, not week-based year
        let at = Utc.with_ymd_and_hms(2018, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(image_name(&at), "IMG31122018-235959.jpg");
    }
}
