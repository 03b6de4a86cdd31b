//! Inventory selection: picks which price tier to click.

use crate::driver::ElementHandle;

/// Marker the platform renders inside a tier that has no stock left.
pub const DEFAULT_SOLD_OUT_MARKER: &str = "已售罄";

/// One purchasable variant as seen on the page at a single moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryOption {
    pub label: String,
    pub sold_out: bool,
    pub handle: ElementHandle,
}

impl InventoryOption {
    /// Build an option from the element's rendered text.
    pub fn from_text(text: &str, sold_out_marker: &str, handle: ElementHandle) -> Self {
        let label = text.trim().to_string();
        let sold_out = !sold_out_marker.is_empty() && label.contains(sold_out_marker);
        Self {
            label,
            sold_out,
            handle,
        }
    }
}

/// Which tier the user wants and whether any other tier will do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionPreference {
    pub preferred_label: Option<String>,
    pub allow_fallback: bool,
}

impl SelectionPreference {
    fn preferred(&self) -> Option<&str> {
        self.preferred_label
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Pick an option according to `pref`, keeping the page's order.
///
/// With a preferred label, the first available option containing it wins;
/// otherwise (or when it is unavailable and fallback is allowed) the first
/// available option wins.
pub fn select<'a>(
    options: &'a [InventoryOption],
    pref: &SelectionPreference,
) -> Option<&'a InventoryOption> {
    let first_available = move || options.iter().find(|o| !o.sold_out);

    match pref.preferred() {
        Some(wanted) => options
            .iter()
            .find(|o| !o.sold_out && o.label.contains(wanted))
            .or_else(|| pref.allow_fallback.then(first_available).flatten()),
        None => first_available(),
    }
}
