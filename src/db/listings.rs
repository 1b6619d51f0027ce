use crate::db::connection::Database;
use crate::db::now_timestamp;
use crate::domain::{SaveOutcome, ScrapedListing, ScrapingStatus, StoredImage, StoredListing};
use crate::errors::ServerError;
use crate::scraper::external_id_for;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, Value, ValueRef};
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, ToSql, TransactionBehavior,
};
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

const LISTING_COLUMNS: &str = "id, external_id, listing_url, title, price, price_numeric, \
     property_type, bedrooms, bathrooms, size, description, key_features, date_added, \
     created_at, scraped_at, scraping_status, scraping_error";

impl ToSql for ScrapingStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ScrapingStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        ScrapingStatus::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown scraping status {s:?}").into()))
    }
}

/// Filters and paging for the listing endpoint.
#[derive(Debug, Clone)]
pub struct ListingQuery {
    pub page: u32,
    pub page_size: u32,
    pub bedrooms: Option<i64>,
    pub property_type: Option<String>,
    pub search: Option<String>,
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            bedrooms: None,
            property_type: None,
            search: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub page: u32,
    pub page_size: u32,
    pub num_pages: u32,
    pub results: Vec<T>,
}

#[derive(Debug, Default, Serialize)]
pub struct ListingStats {
    pub total_properties: i64,
    pub with_price: i64,
    pub average_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub total_images: i64,
    pub by_property_type: BTreeMap<String, i64>,
    pub by_status: BTreeMap<String, i64>,
    pub last_scraped_at: Option<String>,
}

/// Insert or update one listing, keyed by its URL (or external id), and
/// replace its images when the scrape found any.
pub fn save_listing(db: &Database, listing: &ScrapedListing) -> Result<SaveOutcome, ServerError> {
    if listing.listing_url.is_empty() {
        return Err(ServerError::BadRequest("listing has no URL".into()));
    }
    let listing = listing.clone().normalized();

    db.with_conn(|conn| {
        // Take the write lock before the lookup so a concurrent writer cannot
        // invalidate the read snapshot.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_timestamp();

        let existing = find_listing_id(&tx, &listing.listing_url, &listing.external_id)?;
        let (property_id, outcome) = match existing {
            Some(id) => {
                update_listing(&tx, id, &listing, &now)?;
                (id, SaveOutcome::Updated)
            }
            None => (insert_listing(&tx, &listing, &now)?, SaveOutcome::Created),
        };

        if !listing.image_urls.is_empty() {
            replace_images(&tx, property_id, &listing.image_urls, &now)?;
        }

        tx.commit()?;

        tracing::info!(
            id = property_id,
            url = %listing.listing_url,
            outcome = ?outcome,
            images = listing.image_urls.len(),
            "💾 listing saved"
        );
        Ok(outcome)
    })
}

/// Record a listing whose page could not be scraped. Existing data fields are
/// left alone; only the status and error change.
pub fn mark_listing_failed(db: &Database, listing_url: &str, error: &str) -> Result<(), ServerError> {
    let external_id = external_id_for(listing_url);

    db.with_conn(|conn| {
        let now = now_timestamp();
        match find_listing_id(conn, listing_url, &external_id)? {
            Some(id) => {
                conn.execute(
                    "UPDATE property_listings SET scraping_status = ?1, scraping_error = ?2, scraped_at = ?3 WHERE id = ?4",
                    params![ScrapingStatus::Failed, error, now, id],
                )?;
            }
            None => {
                conn.execute(
                    "INSERT INTO property_listings (external_id, listing_url, created_at, scraped_at, scraping_status, scraping_error)
                     VALUES (?1, ?2, ?3, ?3, ?4, ?5)",
                    params![external_id, listing_url, now, ScrapingStatus::Failed, error],
                )?;
            }
        }
        Ok(())
    })
}

fn find_listing_id(
    conn: &Connection,
    listing_url: &str,
    external_id: &str,
) -> Result<Option<i64>, ServerError> {
    Ok(conn
        .query_row(
            "SELECT id FROM property_listings
             WHERE listing_url = ?1 OR external_id = ?2
             ORDER BY listing_url = ?1 DESC
             LIMIT 1",
            params![listing_url, external_id],
            |row| row.get(0),
        )
        .optional()?)
}

fn insert_listing(tx: &Connection, l: &ScrapedListing, now: &str) -> Result<i64, ServerError> {
    tx.execute(
        r#"
        INSERT INTO property_listings (
            external_id, listing_url, title, price, price_numeric, property_type,
            bedrooms, bathrooms, size, description, key_features, date_added,
            created_at, scraped_at, scraping_status, scraping_error
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13, ?14, '')
        "#,
        params![
            l.external_id,
            l.listing_url,
            l.title,
            l.price,
            l.price_numeric,
            l.property_type,
            l.bedrooms,
            l.bathrooms,
            l.size,
            l.description,
            serde_json::to_string(&l.key_features)?,
            l.date_added,
            now,
            ScrapingStatus::Completed,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn update_listing(tx: &Connection, id: i64, l: &ScrapedListing, now: &str) -> Result<(), ServerError> {
    tx.execute(
        r#"
        UPDATE property_listings SET
            title = ?1, price = ?2, price_numeric = ?3, property_type = ?4,
            bedrooms = ?5, bathrooms = ?6, size = ?7, description = ?8,
            key_features = ?9, date_added = ?10, scraped_at = ?11,
            scraping_status = ?12, scraping_error = ''
        WHERE id = ?13
        "#,
        params![
            l.title,
            l.price,
            l.price_numeric,
            l.property_type,
            l.bedrooms,
            l.bathrooms,
            l.size,
            l.description,
            serde_json::to_string(&l.key_features)?,
            l.date_added,
            now,
            ScrapingStatus::Completed,
            id,
        ],
    )?;
    Ok(())
}

/// First image is primary; titles are 1-based.
fn replace_images(tx: &Connection, property_id: i64, urls: &[String], now: &str) -> Result<(), ServerError> {
    tx.execute(
        "DELETE FROM property_images WHERE property_id = ?1",
        params![property_id],
    )?;

    let mut stmt = tx.prepare(
        "INSERT INTO property_images (property_id, image_url, image_title, image_order, is_primary, scraped_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for (i, url) in urls.iter().enumerate() {
        stmt.execute(params![
            property_id,
            url,
            format!("Image {}", i + 1),
            i as i64,
            i == 0,
            now,
        ])?;
    }
    Ok(())
}

fn listing_from_row(row: &Row) -> rusqlite::Result<StoredListing> {
    let features_json: String = row.get(11)?;
    let key_features = serde_json::from_str(&features_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e)))?;

    Ok(StoredListing {
        id: row.get(0)?,
        external_id: row.get(1)?,
        listing_url: row.get(2)?,
        title: row.get(3)?,
        price: row.get(4)?,
        price_numeric: row.get(5)?,
        property_type: row.get(6)?,
        bedrooms: row.get(7)?,
        bathrooms: row.get(8)?,
        size: row.get(9)?,
        description: row.get(10)?,
        key_features,
        date_added: row.get(12)?,
        created_at: row.get(13)?,
        scraped_at: row.get(14)?,
        scraping_status: row.get(15)?,
        scraping_error: row.get(16)?,
        images: Vec::new(),
    })
}

fn load_images(conn: &Connection, property_id: i64) -> Result<Vec<StoredImage>, ServerError> {
    let mut stmt = conn.prepare_cached(
        "SELECT image_url, image_title, image_order, is_primary
         FROM property_images WHERE property_id = ?1
         ORDER BY image_order, scraped_at",
    )?;
    let rows = stmt.query_map(params![property_id], |row| {
        Ok(StoredImage {
            image_url: row.get(0)?,
            image_title: row.get(1)?,
            image_order: row.get(2)?,
            is_primary: row.get(3)?,
        })
    })?;

    let mut images = Vec::new();
    for r in rows {
        images.push(r?);
    }
    Ok(images)
}

pub fn get_listing(db: &Database, id: i64) -> Result<Option<StoredListing>, ServerError> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {LISTING_COLUMNS} FROM property_listings WHERE id = ?1");
        let listing = conn
            .query_row(&sql, params![id], listing_from_row)
            .optional()?;

        match listing {
            Some(mut l) => {
                l.images = load_images(conn, l.id)?;
                Ok(Some(l))
            }
            None => Ok(None),
        }
    })
}

/// Newest scrape first.
pub fn list_listings(db: &Database, query: &ListingQuery) -> Result<Page<StoredListing>, ServerError> {
    let page = query.page.max(1);
    let page_size = query.page_size.clamp(1, MAX_PAGE_SIZE);

    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<Value> = Vec::new();

    if let Some(bedrooms) = query.bedrooms {
        clauses.push("bedrooms = ?");
        args.push(Value::Integer(bedrooms));
    }
    if let Some(property_type) = query.property_type.as_deref().filter(|s| !s.is_empty()) {
        clauses.push("property_type = ? COLLATE NOCASE");
        args.push(Value::Text(property_type.to_string()));
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push(r"(title LIKE ? ESCAPE '\' OR description LIKE ? ESCAPE '\')");
        let pattern = format!("%{}%", escape_like(search));
        args.push(Value::Text(pattern.clone()));
        args.push(Value::Text(pattern));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    db.with_conn(|conn| {
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM property_listings {where_sql}"),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM property_listings {where_sql}
             ORDER BY scraped_at DESC, id DESC
             LIMIT {page_size} OFFSET {offset}",
            offset = (page as i64 - 1) * page_size as i64,
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), listing_from_row)?;

        let mut results = Vec::new();
        for r in rows {
            let mut listing = r?;
            listing.images = load_images(conn, listing.id)?;
            results.push(listing);
        }

        let num_pages = if count == 0 {
            0
        } else {
            ((count + page_size as i64 - 1) / page_size as i64) as u32
        };

        Ok(Page {
            count,
            page,
            page_size,
            num_pages,
            results,
        })
    })
}

/// Make `%`, `_` and the escape character match literally in a LIKE pattern.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn count_listings(conn: &Connection) -> Result<i64, ServerError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM property_listings", [], |row| row.get(0))?)
}

pub fn listing_stats(db: &Database) -> Result<ListingStats, ServerError> {
    db.with_conn(|conn| {
        let (with_price, average_price, min_price, max_price, last_scraped_at): (
            i64,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<String>,
        ) = conn.query_row(
            "SELECT COUNT(price_numeric), AVG(price_numeric), MIN(price_numeric), MAX(price_numeric), MAX(scraped_at)
             FROM property_listings",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;

        let mut stats = ListingStats {
            total_properties: count_listings(conn)?,
            with_price,
            average_price,
            min_price,
            max_price,
            last_scraped_at,
            ..Default::default()
        };

        stats.total_images =
            conn.query_row("SELECT COUNT(*) FROM property_images", [], |row| row.get(0))?;

        stats.by_property_type = grouped_counts(
            conn,
            "SELECT CASE WHEN property_type = '' THEN 'Unknown' ELSE property_type END AS t, COUNT(*)
             FROM property_listings GROUP BY t",
        )?;
        stats.by_status = grouped_counts(
            conn,
            "SELECT scraping_status, COUNT(*) FROM property_listings GROUP BY scraping_status",
        )?;

        Ok(stats)
    })
}

fn grouped_counts(conn: &Connection, sql: &str) -> Result<BTreeMap<String, i64>, ServerError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

    let mut out = BTreeMap::new();
    for r in rows {
        let (key, n) = r?;
        out.insert(key, n);
    }
    Ok(out)
}
