use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgRow, Postgres};
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use nestwatch_common::types::{
    AdminStatus, Furnished, ListingFilter, LocalListing, Location, PageRequest, PropertyType,
    PublicFilter, ScrapedListing,
};

use crate::{enum_from_text, enum_text, is_unique_violation, PgStore};

fn listing_from_row(row: &PgRow) -> Result<ScrapedListing> {
    Ok(ScrapedListing {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        source_website: row.try_get("source_website")?,
        source_url: row.try_get("source_url")?,
        source_listing_id: row.try_get("source_listing_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        description_snippet: row.try_get("description_snippet")?,
        price: row.try_get("price")?,
        location: Location {
            town: row.try_get("town")?,
            district: row.try_get("district")?,
            province: row.try_get("province")?,
            raw_address: row.try_get("raw_address")?,
        },
        beds: row.try_get::<i32, _>("beds")? as u32,
        baths: row.try_get::<i32, _>("baths")? as u32,
        size_sqft: row.try_get::<i32, _>("size_sqft")? as u32,
        property_type: enum_from_text::<PropertyType>(
            row.try_get::<String, _>("property_type")?.as_str(),
        )?,
        furnished: enum_from_text::<Furnished>(row.try_get::<String, _>("furnished")?.as_str())?,
        images: serde_json::from_value(row.try_get("images")?)?,
        scraped_at: row.try_get("scraped_at")?,
        last_checked: row.try_get("last_checked")?,
        is_active: row.try_get("is_active")?,
        expires_at: row.try_get("expires_at")?,
        pii_detected: row.try_get("pii_detected")?,
        pii_details: serde_json::from_value(row.try_get("pii_details")?)?,
        ai_analysis: serde_json::from_value(row.try_get("ai_analysis")?)?,
        admin_status: enum_from_text::<AdminStatus>(
            row.try_get::<String, _>("admin_status")?.as_str(),
        )?,
        admin_notes: row.try_get("admin_notes")?,
        assigned_to: row.try_get("assigned_to")?,
        reviewed_by: row.try_get("reviewed_by")?,
        reviewed_at: row.try_get("reviewed_at")?,
        show_full_description: row.try_get("show_full_description")?,
        show_images: row.try_get("show_images")?,
        views: row.try_get::<i64, _>("views")? as u64,
        click_throughs: row.try_get::<i64, _>("click_throughs")? as u64,
    })
}

fn push_admin_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ListingFilter) {
    if let Some(status) = &filter.status {
        qb.push(" AND admin_status = ").push_bind(enum_text(status));
    }
    if let Some(source) = &filter.source_website {
        qb.push(" AND source_website ILIKE ")
            .push_bind(format!("%{source}%"));
    }
    if let Some(town) = &filter.town {
        qb.push(" AND town ILIKE ").push_bind(format!("%{town}%"));
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND price <= ").push_bind(max);
    }
    if let Some(min_quality) = filter.min_quality {
        qb.push(" AND (ai_analysis->>'quality_score')::int >= ")
            .push_bind(min_quality as i32);
    }
    if let Some(max_risk) = filter.max_scam_risk {
        qb.push(" AND (ai_analysis->>'scam_risk_score')::int <= ")
            .push_bind(max_risk as i32);
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{search}%");
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn push_public_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &PublicFilter) {
    qb.push(" AND admin_status = 'approved' AND is_active = TRUE");
    if let Some(town) = &filter.town {
        qb.push(" AND town ILIKE ").push_bind(format!("%{town}%"));
    }
    if let Some(beds) = filter.beds {
        qb.push(" AND beds = ").push_bind(beds as i32);
    }
    if let Some(pt) = &filter.property_type {
        qb.push(" AND property_type = ").push_bind(enum_text(pt));
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND price <= ").push_bind(max);
    }
}

impl PgStore {
    pub async fn find_listing_by_source_url(&self, url: &str) -> Result<Option<ScrapedListing>> {
        let row = sqlx::query("SELECT * FROM scraped_listings WHERE source_url = $1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(listing_from_row).transpose()
    }

    pub async fn get_listing(&self, id: Uuid) -> Result<Option<ScrapedListing>> {
        let row = sqlx::query("SELECT * FROM scraped_listings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(listing_from_row).transpose()
    }

    /// Insert a new listing. Returns false when another record already
    /// owns this source_url (the unique index fails the race closed).
    pub async fn insert_listing(&self, l: &ScrapedListing) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO scraped_listings
               (id, source_id, source_website, source_url, source_listing_id,
                title, description, description_snippet, price,
                town, district, province, raw_address,
                beds, baths, size_sqft, property_type, furnished, images,
                scraped_at, last_checked, is_active, expires_at,
                pii_detected, pii_details, ai_analysis,
                admin_status, admin_notes, assigned_to, reviewed_by, reviewed_at,
                show_full_description, show_images, views, click_throughs)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                     $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24,
                     $25, $26, $27, $28, $29, $30, $31, $32, $33, $34, $35)",
        )
        .bind(l.id)
        .bind(l.source_id)
        .bind(&l.source_website)
        .bind(&l.source_url)
        .bind(&l.source_listing_id)
        .bind(&l.title)
        .bind(&l.description)
        .bind(&l.description_snippet)
        .bind(l.price)
        .bind(&l.location.town)
        .bind(&l.location.district)
        .bind(&l.location.province)
        .bind(&l.location.raw_address)
        .bind(l.beds as i32)
        .bind(l.baths as i32)
        .bind(l.size_sqft as i32)
        .bind(enum_text(&l.property_type))
        .bind(enum_text(&l.furnished))
        .bind(serde_json::to_value(&l.images)?)
        .bind(l.scraped_at)
        .bind(l.last_checked)
        .bind(l.is_active)
        .bind(l.expires_at)
        .bind(l.pii_detected)
        .bind(serde_json::to_value(&l.pii_details)?)
        .bind(serde_json::to_value(&l.ai_analysis)?)
        .bind(enum_text(&l.admin_status))
        .bind(&l.admin_notes)
        .bind(l.assigned_to)
        .bind(l.reviewed_by)
        .bind(l.reviewed_at)
        .bind(l.show_full_description)
        .bind(l.show_images)
        .bind(l.views as i64)
        .bind(l.click_throughs as i64)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Re-sighting during a recheck job.
    pub async fn touch_listing_recheck(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE scraped_listings SET last_checked = $2, is_active = TRUE WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rewrite admin-editable fields and enrichment output.
    pub async fn update_listing(&self, l: &ScrapedListing) -> Result<()> {
        sqlx::query(
            "UPDATE scraped_listings SET
               title = $2, description = $3, description_snippet = $4, price = $5,
               town = $6, district = $7, province = $8, raw_address = $9,
               beds = $10, baths = $11, size_sqft = $12, property_type = $13,
               furnished = $14, images = $15, is_active = $16, expires_at = $17,
               ai_analysis = $18, admin_status = $19, admin_notes = $20,
               assigned_to = $21, reviewed_by = $22, reviewed_at = $23,
               show_full_description = $24, show_images = $25
             WHERE id = $1",
        )
        .bind(l.id)
        .bind(&l.title)
        .bind(&l.description)
        .bind(&l.description_snippet)
        .bind(l.price)
        .bind(&l.location.town)
        .bind(&l.location.district)
        .bind(&l.location.province)
        .bind(&l.location.raw_address)
        .bind(l.beds as i32)
        .bind(l.baths as i32)
        .bind(l.size_sqft as i32)
        .bind(enum_text(&l.property_type))
        .bind(enum_text(&l.furnished))
        .bind(serde_json::to_value(&l.images)?)
        .bind(l.is_active)
        .bind(l.expires_at)
        .bind(serde_json::to_value(&l.ai_analysis)?)
        .bind(enum_text(&l.admin_status))
        .bind(&l.admin_notes)
        .bind(l.assigned_to)
        .bind(l.reviewed_by)
        .bind(l.reviewed_at)
        .bind(l.show_full_description)
        .bind(l.show_images)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn query_listings(
        &self,
        filter: &ListingFilter,
        page: PageRequest,
    ) -> Result<(Vec<ScrapedListing>, u64)> {
        let mut qb = QueryBuilder::new("SELECT * FROM scraped_listings WHERE TRUE");
        push_admin_filters(&mut qb, filter);
        qb.push(" ORDER BY scraped_at DESC LIMIT ")
            .push_bind(page.per_page as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
        let rows = qb.build().fetch_all(&self.pool).await?;
        let listings = rows
            .iter()
            .map(listing_from_row)
            .collect::<Result<Vec<_>>>()?;

        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM scraped_listings WHERE TRUE");
        push_admin_filters(&mut count_qb, filter);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        Ok((listings, total as u64))
    }

    pub async fn query_public_listings(
        &self,
        filter: &PublicFilter,
        page: PageRequest,
    ) -> Result<(Vec<ScrapedListing>, u64)> {
        let mut qb = QueryBuilder::new("SELECT * FROM scraped_listings WHERE TRUE");
        push_public_filters(&mut qb, filter);
        qb.push(" ORDER BY scraped_at DESC LIMIT ")
            .push_bind(page.per_page as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
        let rows = qb.build().fetch_all(&self.pool).await?;
        let listings = rows
            .iter()
            .map(listing_from_row)
            .collect::<Result<Vec<_>>>()?;

        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM scraped_listings WHERE TRUE");
        push_public_filters(&mut count_qb, filter);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        Ok((listings, total as u64))
    }

    pub async fn all_listings(&self) -> Result<Vec<ScrapedListing>> {
        let rows = sqlx::query("SELECT * FROM scraped_listings ORDER BY scraped_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(listing_from_row).collect()
    }

    pub async fn listing_status_counts(&self) -> Result<Vec<(AdminStatus, u64)>> {
        let rows = sqlx::query(
            "SELECT admin_status, COUNT(*) AS n FROM scraped_listings GROUP BY admin_status",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let status =
                    enum_from_text::<AdminStatus>(row.try_get::<String, _>("admin_status")?.as_str())?;
                let n: i64 = row.try_get("n")?;
                Ok((status, n as u64))
            })
            .collect()
    }

    pub async fn set_status_by_ids(
        &self,
        ids: &[Uuid],
        status: AdminStatus,
        reviewed_by: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE scraped_listings
             SET admin_status = $2,
                 reviewed_by = COALESCE($3, reviewed_by),
                 reviewed_at = CASE WHEN $3 IS NULL THEN reviewed_at ELSE $4 END
             WHERE id = ANY($1)",
        )
        .bind(ids)
        .bind(enum_text(&status))
        .bind(reviewed_by)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_status_by_source(
        &self,
        source_id: Uuid,
        status: AdminStatus,
        reviewed_by: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE scraped_listings
             SET admin_status = $2,
                 reviewed_by = COALESCE($3, reviewed_by),
                 reviewed_at = CASE WHEN $3 IS NULL THEN reviewed_at ELSE $4 END
             WHERE source_id = $1",
        )
        .bind(source_id)
        .bind(enum_text(&status))
        .bind(reviewed_by)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_listings_by_ids(&self, ids: &[Uuid]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM scraped_listings WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_listings_by_source(&self, source_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM scraped_listings WHERE source_id = $1")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// One batched increment per public result page.
    pub async fn increment_views(&self, ids: &[Uuid]) -> Result<()> {
        sqlx::query("UPDATE scraped_listings SET views = views + 1 WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn increment_click_through(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE scraped_listings SET click_throughs = click_throughs + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Time-based expiry sweep. Hidden listings expire too; deletion
    /// stays explicit.
    pub async fn expire_due_listings(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE scraped_listings SET admin_status = 'expired'
             WHERE expires_at <= $1 AND admin_status <> 'expired'",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // --- Local inventory mirror ---

    pub async fn approved_local_listings(&self) -> Result<Vec<LocalListing>> {
        let rows = sqlx::query(
            "SELECT town, price, beds, baths FROM local_listings WHERE status = 'approved'",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(LocalListing {
                    town: row.try_get("town")?,
                    price: row.try_get("price")?,
                    beds: row.try_get::<i32, _>("beds")? as u32,
                    baths: row.try_get::<i32, _>("baths")? as u32,
                })
            })
            .collect()
    }

    pub async fn insert_local_listing(&self, l: &LocalListing) -> Result<()> {
        sqlx::query(
            "INSERT INTO local_listings (id, town, price, beds, baths, status)
             VALUES ($1, $2, $3, $4, $5, 'approved')",
        )
        .bind(Uuid::new_v4())
        .bind(&l.town)
        .bind(l.price)
        .bind(l.beds as i32)
        .bind(l.baths as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
