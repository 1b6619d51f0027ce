// templates/pages/home.rs

use crate::db::jobs::JobCounts;
use crate::db::listings::ListingStats;
use crate::domain::{ScrapeJob, StoredListing};
use crate::templates::{card, desktop_layout};
use maud::{html, Markup};

pub struct HomeVm {
    pub stats: ListingStats,
    pub job_counts: JobCounts,
    pub listings: Vec<StoredListing>,
    pub jobs: Vec<ScrapeJob>,
}

pub fn home_page(vm: &HomeVm) -> Markup {
    desktop_layout(
        "Listings",
        html! {
            main {
                h1 { "Scraped Listings" }

                (card("Overview", html! {
                    p {
                        strong { (vm.stats.total_properties) } " listings, "
                        strong { (vm.stats.total_images) } " images. "
                        @if let Some(avg) = vm.stats.average_price {
                            "Average price £" (format!("{avg:.0}")) "."
                        }
                    }
                    p class="muted" {
                        "Jobs: " (vm.job_counts.pending) " pending, "
                        (vm.job_counts.running) " running, "
                        (vm.job_counts.completed) " completed, "
                        (vm.job_counts.failed) " failed."
                    }
                    p class="muted" {
                        "Queue a scrape with "
                        code { "POST /api/scrape/ {\"search_url\": \"…\", \"max_pages\": 5}" }
                    }
                }))

                (card("Recent Jobs", jobs_table(&vm.jobs)))
                (card("Latest Listings", listings_table(&vm.listings)))
            }
        },
    )
}

fn jobs_table(jobs: &[ScrapeJob]) -> Markup {
    html! {
        @if jobs.is_empty() {
            p class="muted" { "No scrape jobs yet." }
        } @else {
            table {
                thead {
                    tr {
                        th { "ID" }
                        th { "Started" }
                        th { "Finished" }
                        th { "Status" }
                        th { "Pages" }
                        th { "Found" }
                        th { "New" }
                        th { "Updated" }
                        th { "Failed" }
                    }
                }
                tbody {
                    @for job in jobs {
                        tr {
                            td { a href=(format!("/api/jobs/{}/", job.id)) { (job.id) } }
                            td class="muted" { (job.started_at.as_deref().unwrap_or("—")) }
                            td class="muted" {
                                @if job.status.is_finished() {
                                    (job.finished_at.as_deref().unwrap_or("—"))
                                } @else {
                                    "—"
                                }
                            }
                            td {
                                span class=(format!("status-{}", job.status.as_str())) { (job.status.as_str()) }
                                @if let Some(err) = &job.error_message {
                                    br; span class="muted" style="font-size: 0.8em;" { (err) }
                                }
                            }
                            td { (job.pages_fetched) }
                            td { (job.urls_found) }
                            td { (job.properties_created) }
                            td { (job.properties_updated) }
                            td { (job.properties_failed) }
                        }
                    }
                }
            }
        }
    }
}

fn listings_table(listings: &[StoredListing]) -> Markup {
    html! {
        @if listings.is_empty() {
            p class="muted" { "Nothing scraped yet." }
        } @else {
            table {
                thead {
                    tr {
                        th { "" }
                        th { "Title" }
                        th { "Price" }
                        th { "Type" }
                        th { "Beds" }
                        th { "Baths" }
                        th { "Size" }
                        th { "Images" }
                        th { "Added" }
                        th { "Status" }
                    }
                }
                tbody {
                    @for l in listings {
                        tr {
                            td {
                                @if let Some(src) = l.primary_image() {
                                    img src=(src) alt="" width="80" loading="lazy";
                                }
                            }
                            td {
                                a href=(l.listing_url) {
                                    @if l.title.is_empty() { (l.external_id) } @else { (l.title) }
                                }
                            }
                            td { (l.price) }
                            td { (l.property_type) }
                            td { @if let Some(n) = l.bedrooms { (n) } }
                            td { @if let Some(n) = l.bathrooms { (n) } }
                            td { (l.size) }
                            td { (l.image_count()) }
                            td {
                                @if let Some(d) = l.date_added { (d.format("%d/%m/%Y").to_string()) }
                            }
                            td {
                                span class=(format!("status-{}", l.scraping_status.as_str())) {
                                    (l.scraping_status.as_str())
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}
