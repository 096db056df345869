//! Shared value types: timestamps, labelled enums and list queries
use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown label `{0}`")]
pub struct UnknownLabel(pub String);

/// Declares a closed enumeration with stable upper-snake labels.
///
/// The labels are what payloads carry, what reports group by and what CSV
/// exports print. CBOR indices are fixed per variant so stored records stay
/// readable when variants are appended.
macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident = ($idx:tt, $label:tt)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, minicbor::Encode, minicbor::Decode)]
        $vis enum $name {
            $(#[n($idx)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub const LABELS: &'static [&'static str] = &[$($label),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::types::UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = $crate::types::normalize_label(s);
                match normalized.as_str() {
                    $($label => Ok($name::$variant),)+
                    _ => Err($crate::types::UnknownLabel(s.to_string())),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}
pub(crate) use labelled_enum;

/// `under mediation`, `Under-Mediation` and `UNDER_MEDIATION` all name the same label.
pub fn normalize_label(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(TimeStamp)
            .unwrap_or_else(|| TimeStamp(DateTime::<Utc>::UNIX_EPOCH))
    }
    /// Midnight UTC of a calendar date. Used for birth, incident and term dates.
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.and_time(chrono::NaiveTime::MIN).and_utc())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn date_naive(&self) -> NaiveDate {
        self.0.date_naive()
    }
    pub fn year(&self) -> i32 {
        self.0.year()
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Serialize for TimeStamp<Utc> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

pub const DEFAULT_PER_PAGE: usize = 20;
pub const MAX_PER_PAGE: usize = 100;

/// Filters shared by every list endpoint. Pages are 1-based.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

/// What a record exposes to [`ListQuery`].
pub trait Listable {
    fn status_label(&self) -> &'static str;
    fn category_label(&self) -> Option<&str> {
        None
    }
    /// Text matched by free-text search, compared lowercase.
    fn search_text(&self) -> String;
    fn listed_at(&self) -> &TimeStamp<Utc>;
}

#[derive(Debug, Serialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub pages: usize,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.into());
        self
    }
    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.into());
        self
    }
    pub fn with_search(mut self, search: &str) -> Self {
        self.search = Some(search.into());
        self
    }
    pub fn with_page(mut self, page: usize, per_page: usize) -> Self {
        self.page = Some(page);
        self.per_page = Some(per_page);
        self
    }

    fn matches<T: Listable>(&self, row: &T) -> bool {
        if let Some(status) = non_blank(&self.status) {
            if normalize_label(status) != row.status_label() {
                return false;
            }
        }
        if let Some(category) = non_blank(&self.category) {
            if row.category_label().map(normalize_label) != Some(normalize_label(category)) {
                return false;
            }
        }
        if let Some(needle) = non_blank(&self.search) {
            if !row
                .search_text()
                .to_lowercase()
                .contains(&needle.trim().to_lowercase())
            {
                return false;
            }
        }
        true
    }

    /// Filter, order newest first, then cut the requested page.
    pub fn apply<T: Listable>(&self, rows: Vec<T>) -> Listing<T> {
        let mut rows: Vec<T> = rows.into_iter().filter(|row| self.matches(row)).collect();
        rows.sort_by(|a, b| b.listed_at().cmp(a.listed_at()));

        let per_page = self
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);
        let page = self.page.unwrap_or(1).max(1);
        let total = rows.len();
        let pages = total.div_ceil(per_page);

        let items = rows
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();

        Listing {
            items,
            total,
            page,
            per_page,
            pages,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    labelled_enum! {
        enum Colour {
            Red = (0, "RED"),
            DarkBlue = (1, "DARK_BLUE"),
        }
    }

    struct Row {
        label: &'static str,
        name: String,
        at: TimeStamp<Utc>,
    }

    impl Listable for Row {
        fn status_label(&self) -> &'static str {
            self.label
        }
        fn search_text(&self) -> String {
            self.name.clone()
        }
        fn listed_at(&self) -> &TimeStamp<Utc> {
            &self.at
        }
    }

    fn rows() -> Vec<Row> {
        (1..=5)
            .map(|day| Row {
                label: if day % 2 == 0 { "ACTIVE" } else { "INACTIVE" },
                name: format!("Juan Dela Cruz {day}"),
                at: TimeStamp::new_with(2024, 3, day, 0, 0, 0),
            })
            .collect()
    }

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn timestamps_order_chronologically() {
        let earlier = TimeStamp::new_with(2023, 12, 31, 23, 59, 59);
        let later = TimeStamp::new_with(2024, 1, 1, 0, 0, 0);
        assert!(earlier < later);
        assert_eq!(later.year(), 2024);
    }

    #[test]
    fn labels_parse_loosely() {
        assert_eq!("dark blue".parse::<Colour>(), Ok(Colour::DarkBlue));
        assert_eq!("Dark-Blue".parse::<Colour>(), Ok(Colour::DarkBlue));
        assert_eq!(Colour::Red.to_string(), "RED");
        assert!("green".parse::<Colour>().is_err());
        assert_eq!(Colour::LABELS, &["RED", "DARK_BLUE"]);
    }

    #[test]
    fn list_query_filters_and_pages() {
        let listing = ListQuery::new().with_status("active").apply(rows());
        assert_eq!(listing.total, 2);
        assert_eq!(listing.items[0].name, "Juan Dela Cruz 4");

        let listing = ListQuery::new().with_search("cruz 3").apply(rows());
        assert_eq!(listing.total, 1);

        let listing = ListQuery::new().with_page(2, 2).apply(rows());
        assert_eq!(listing.total, 5);
        assert_eq!(listing.pages, 3);
        assert_eq!(listing.items.len(), 2);
        assert_eq!(listing.items[0].name, "Juan Dela Cruz 3");
    }

    #[test]
    fn empty_listing_is_not_an_error() {
        let listing = ListQuery::new().apply(Vec::<Row>::new());
        assert_eq!(listing.total, 0);
        assert_eq!(listing.pages, 0);
        assert!(listing.items.is_empty());
    }
}
