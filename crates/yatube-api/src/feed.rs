//! Feed builder: turns an ordered `FeedView` into one page of posts.
//!
//! Ordering is owned by the query layer (`created_at` descending). This
//! module only does the window arithmetic and never re-sorts.

use anyhow::anyhow;

use yatube_db::{Database, FeedView};
use yatube_types::api::Page;
use yatube_types::models::Post;

use crate::convert;
use crate::error::{BlogError, Result};

/// Posts per page for every feed.
pub const PAGE_SIZE: u32 = 10;

/// The slice of a feed that one page covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u32,
    pub total_pages: u32,
    pub limit: u32,
    pub offset: u32,
}

impl PageWindow {
    /// Pages are 1-based. Page 0 and pages past the end are `NotFound`,
    /// except that page 1 of an empty feed is a valid empty page.
    pub fn resolve(total_items: u64, page_number: u32, page_size: u32) -> Result<Self> {
        if page_size == 0 {
            return Err(anyhow!("page size must be positive").into());
        }

        let total_pages = u32::try_from(total_items.div_ceil(page_size as u64))
            .map_err(|_| anyhow!("too many pages for {} items", total_items))?;

        let in_range = page_number >= 1 && (page_number <= total_pages || page_number == 1);
        if !in_range {
            return Err(BlogError::NotFound(format!(
                "page {} (feed has {} pages)",
                page_number, total_pages
            )));
        }

        let offset = (page_number - 1)
            .checked_mul(page_size)
            .ok_or_else(|| anyhow!("page offset overflow"))?;

        Ok(Self {
            number: page_number,
            total_pages,
            limit: if total_pages == 0 { 0 } else { page_size },
            offset,
        })
    }

    pub fn into_page<T>(self, items: Vec<T>, total_items: u64) -> Page<T> {
        Page {
            items,
            page_number: self.number,
            total_pages: self.total_pages,
            total_items,
            has_next: self.number < self.total_pages,
            has_previous: self.number > 1,
        }
    }
}

/// One page of `view`, newest first. The count and the rows are read under
/// one lock, so the metadata always matches the items.
pub fn paginate(db: &Database, view: FeedView<'_>, page_number: u32, page_size: u32) -> Result<Page<Post>> {
    let (total, window, rows) = db.feed_window(view, |total| {
        let window = PageWindow::resolve(total, page_number, page_size)?;
        Ok::<_, BlogError>((window, window.limit, window.offset))
    })?;

    let items = rows.into_iter().map(convert::post).collect();
    Ok(window.into_page(items, total))
}
