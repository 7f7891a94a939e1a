use crate::models::{property_id_from_filename, ListingRecord, ListingType, DEFAULT_COUNTRY};
use crate::normalize::{iso_code, parse_area, parse_area_field};
use crate::scrapers::traits::ListingParser;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

// Selectors for 101evler listing pages
mod selectors {
    use super::*;

    fn parse(css: &str) -> Selector {
        Selector::parse(css).expect("valid selector")
    }

    pub static QUICK_LOOK: LazyLock<Selector> =
        LazyLock::new(|| parse("div#hizli-bakis div.zebra-rows"));
    pub static DETAILS: LazyLock<Selector> = LazyLock::new(|| parse("div#konut-detaylari"));
    pub static SIDEBAR: LazyLock<Selector> = LazyLock::new(|| parse("div.h-zl-bak-sright"));
    pub static ROW: LazyLock<Selector> = LazyLock::new(|| parse("div.text-block-141"));
    pub static ROW_LABEL: LazyLock<Selector> = LazyLock::new(|| parse("div.col-5"));
    pub static ROW_VALUE: LazyLock<Selector> = LazyLock::new(|| parse("div.col-7"));
    pub static STRONG: LazyLock<Selector> = LazyLock::new(|| parse("strong"));

    pub static HEADING: LazyLock<Selector> = LazyLock::new(|| parse("h1"));
    pub static TITLE_BLOCK: LazyLock<Selector> = LazyLock::new(|| parse("div.text-block-135"));
    pub static HEAD_TITLE: LazyLock<Selector> = LazyLock::new(|| parse("title"));
    pub static OG_TITLE: LazyLock<Selector> =
        LazyLock::new(|| parse("meta[property='og:title']"));
    pub static OG_URL: LazyLock<Selector> = LazyLock::new(|| parse("meta[property='og:url']"));
    pub static OG_IMAGE: LazyLock<Selector> =
        LazyLock::new(|| parse("meta[property='og:image']"));
    pub static META_DESCRIPTION: LazyLock<Selector> =
        LazyLock::new(|| parse("meta[name='description']"));

    pub static DESCRIPTION: LazyLock<Selector> =
        LazyLock::new(|| parse("div.div-block-361[style='line-break:anywhere']"));
    pub static DESCRIPTION_PART: LazyLock<Selector> =
        LazyLock::new(|| parse("p.f-s-16, div.f-s-16"));

    pub static AGENCY: LazyLock<Selector> = LazyLock::new(|| {
        parse("div.text-block-157, a.text-block-157, div.text-block-204, a.text-block-204")
    });
    pub static ROOM_ICON: LazyLock<Selector> = LazyLock::new(|| parse("div.text-block-138"));

    pub static GALLERY_IMAGE: LazyLock<Selector> =
        LazyLock::new(|| parse("div.splide.mainGallerySplide li.splide__slide img"));
    pub static GALLERY_LINK: LazyLock<Selector> =
        LazyLock::new(|| parse("a[data-fancybox='gallery-mobile']"));

    pub static TEL_LINK: LazyLock<Selector> = LazyLock::new(|| parse("a[href^='tel:']"));
    pub static SHOWPHONE: LazyLock<Selector> =
        LazyLock::new(|| parse("[onclick*='showphone']"));
    pub static PHONE_TEXT: LazyLock<Selector> = LazyLock::new(|| {
        parse("div.propDetailPhone, span.propDetailPhone, div.text-block-80, span.text-block-80")
    });
    pub static WHATSAPP_LINK: LazyLock<Selector> =
        LazyLock::new(|| parse("a[href*='wa.me/']"));
}

mod patterns {
    use super::*;

    fn parse(re: &str) -> Regex {
        Regex::new(re).expect("valid regex")
    }

    pub static PRICE: LazyLock<Regex> = LazyLock::new(|| parse(r"^([£$€₺])\s*([0-9,.]+)"));
    pub static ROOMS: LazyLock<Regex> = LazyLock::new(|| parse(r"(\d+\+\d+)"));
    pub static LISTING_DATE: LazyLock<Regex> =
        LazyLock::new(|| parse(r"(?i)İlan\s+Tarihi\s*:?\s*(\d{2}/\d{2}/\d{4})"));
    pub static UPDATE_DATE: LazyLock<Regex> =
        LazyLock::new(|| parse(r"(?i)Güncelleme\s+Tarihi\s*:?\s*(\d{2}/\d{2}/\d{4})"));
    pub static LOCATION: LazyLock<Regex> = LazyLock::new(|| parse(r"Konum\s*:?\s*([^\n]+)"));
    pub static SHOWPHONE: LazyLock<Regex> =
        LazyLock::new(|| parse(r#"showphone\s*\([^,]+,\s*['"]([^'"]+)['"]"#));
    pub static MOBILE: LazyLock<Regex> =
        LazyLock::new(|| parse(r"(?:\+90|0)(?:5\d{2})\s*\d{3}\s*\d{2}\s*\d{2}"));
    pub static WHATSAPP: LazyLock<Regex> = LazyLock::new(|| parse(r"wa\.me/(\d+)"));
}

/// Parser for saved 101evler.com listing pages
pub struct EvlerParser {
    country: String,
}

impl EvlerParser {
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
        }
    }
}

impl Default for EvlerParser {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTRY)
    }
}

/// Label/value pair from one of the two-column tables
struct Row {
    label: String,
    value: String,
}

/// A parsed page with its tables collected up front
struct Page {
    document: Html,
    quick_look: Vec<Row>,
    details: Vec<Row>,
    sidebar: Vec<Row>,
    text: String,
}

impl Page {
    fn new(html: &str) -> Self {
        let document = Html::parse_document(html);
        let quick_look = collect_rows(&document, &selectors::QUICK_LOOK, true);
        let details = collect_rows(&document, &selectors::DETAILS, true);
        let sidebar = collect_rows(&document, &selectors::SIDEBAR, false);
        let text = document
            .root_element()
            .text()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            document,
            quick_look,
            details,
            sidebar,
            text,
        }
    }

    fn quick_look(&self, label: &str) -> Option<String> {
        lookup(&self.quick_look, label)
    }

    fn details(&self, label: &str) -> Option<String> {
        lookup(&self.details, label)
    }

    fn sidebar(&self, label: &str) -> Option<String> {
        lookup(&self.sidebar, label)
    }

    fn text_capture(&self, pattern: &Regex) -> Option<String> {
        pattern.captures(&self.text).map(|caps| caps[1].to_string())
    }

    fn first(&self, selector: &Selector) -> Option<ElementRef<'_>> {
        self.document.select(selector).next()
    }
}

fn collect_rows(document: &Html, block: &Selector, prefer_strong: bool) -> Vec<Row> {
    document
        .select(block)
        .flat_map(|block| block.select(&selectors::ROW))
        .filter_map(|row| {
            let label = row.select(&selectors::ROW_LABEL).next()?;
            let value = row.select(&selectors::ROW_VALUE).next()?;
            let strong = prefer_strong
                .then(|| value.select(&selectors::STRONG).next())
                .flatten();

            Some(Row {
                label: strip_text(label),
                value: strip_text(strong.unwrap_or(value)),
            })
        })
        .collect()
}

fn lookup(rows: &[Row], label: &str) -> Option<String> {
    rows.iter()
        .find(|row| row.label.contains(label) && !row.value.is_empty())
        .map(|row| row.value.clone())
}

/// Text of an element with each text node trimmed and glued together
fn strip_text(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).collect()
}

fn non_empty(s: String) -> Option<String> {
    let s = s.trim().to_string();
    (!s.is_empty()).then_some(s)
}

fn meta_content(page: &Page, selector: &Selector) -> Option<String> {
    page.first(selector)
        .and_then(|meta| meta.value().attr("content"))
        .and_then(|content| non_empty(content.to_string()))
}

/// One way of finding a field; tiers are tried in order until one answers
type Tier<T> = fn(&Page) -> Option<T>;

fn first_of<T>(page: &Page, tiers: &[Tier<T>]) -> Option<T> {
    tiers.iter().find_map(|tier| tier(page))
}

/// District and city, in the page's "District / City" order
#[derive(Debug, Clone, PartialEq)]
struct Place {
    district: Option<String>,
    city: Option<String>,
}

impl Place {
    fn split(raw: &str, separators: [char; 2]) -> Option<Self> {
        separators.iter().find_map(|sep| {
            let mut parts = raw.split(*sep);
            let district = parts.next()?;
            let city = parts.next()?;
            Some(Self {
                district: non_empty(district.to_string()),
                city: non_empty(city.to_string()),
            })
        })
    }
}

const TITLE: &[Tier<String>] = &[
    |page| page.first(&selectors::HEADING).map(strip_text).and_then(non_empty),
    |page| page.first(&selectors::TITLE_BLOCK).map(strip_text).and_then(non_empty),
    |page| meta_content(page, &selectors::OG_TITLE),
    |page| {
        let full = strip_text(page.first(&selectors::HEAD_TITLE)?);
        full.split(" - ").next().map(str::to_string).and_then(non_empty)
    },
];

const DESCRIPTION: &[Tier<String>] = &[
    |page| {
        let block = page.first(&selectors::DESCRIPTION)?;
        let parts: Vec<String> = block
            .select(&selectors::DESCRIPTION_PART)
            .map(strip_text)
            .collect();
        if parts.is_empty() {
            non_empty(strip_text(block))
        } else {
            non_empty(parts.join(" "))
        }
    },
    |page| meta_content(page, &selectors::META_DESCRIPTION),
];

const ROOM_COUNT: &[Tier<String>] = &[
    |page| page.quick_look("Oda Sayısı"),
    |page| page.details("Oda Sayısı"),
    |page| {
        page.document
            .select(&selectors::ROOM_ICON)
            .find_map(|icon| page_rooms(&strip_text(icon)))
    },
];

const LISTING_DATE: &[Tier<String>] = &[
    |page| page.quick_look("İlan Tarihi"),
    |page| page.sidebar("İlan Tarihi"),
    |page| page.text_capture(&patterns::LISTING_DATE),
];

const UPDATE_DATE: &[Tier<String>] = &[
    |page| page.quick_look("Güncelleme Tarihi"),
    |page| page.sidebar("Güncelleme Tarihi"),
    |page| page.text_capture(&patterns::UPDATE_DATE),
];

const PLACE: &[Tier<Place>] = &[
    |page| Place::split(&page.quick_look("Konum")?, [',', '/']),
    |page| Place::split(&page.sidebar("Konum")?, ['/', ',']),
    |page| {
        patterns::LOCATION
            .captures_iter(&page.text)
            .find_map(|caps| Place::split(&caps[1], ['/', ',']))
    },
];

fn page_rooms(text: &str) -> Option<String> {
    patterns::ROOMS.captures(text).map(|caps| caps[1].to_string())
}

/// `$580 (~ 22,291 TL)` -> (580.0, "USD")
fn parse_price(value: &str) -> Option<(f64, String)> {
    let caps = patterns::PRICE.captures(value.trim())?;
    let amount = caps[2].replace(',', "").parse::<f64>().ok()?;
    Some((amount, iso_code(&caps[1]).to_string()))
}

fn agency_name(page: &Page) -> Option<String> {
    page.document
        .select(&selectors::AGENCY)
        .map(strip_text)
        .find(|text| {
            text.chars().count() > 3
                && !text.starts_with('+')
                && !text.chars().all(|c| c.is_ascii_digit())
        })
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() && !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

fn join_values(values: Vec<String>) -> Option<String> {
    (!values.is_empty()).then(|| values.join(","))
}

fn image_urls(document: &Html) -> Vec<String> {
    let mut urls = Vec::new();

    for img in document.select(&selectors::GALLERY_IMAGE) {
        for attr in ["src", "data-splide-lazy"] {
            if let Some(url) = img.value().attr(attr).filter(|u| u.contains("property")) {
                push_unique(&mut urls, url);
            }
        }
    }

    for link in document.select(&selectors::GALLERY_LINK) {
        if let Some(url) = link.value().attr("href").filter(|u| u.contains("property")) {
            push_unique(&mut urls, url);
        }
    }

    for meta in document.select(&selectors::OG_IMAGE) {
        if let Some(url) = meta.value().attr("content").filter(|u| u.contains("property")) {
            push_unique(&mut urls, url);
        }
    }

    urls
}

fn is_phone_like(number: &str) -> bool {
    number.starts_with('+')
        || (!number.is_empty() && number.chars().all(|c| c.is_ascii_digit()))
}

fn phone_numbers(document: &Html) -> Vec<String> {
    let mut numbers = Vec::new();

    for link in document.select(&selectors::TEL_LINK) {
        let href = link.value().attr("href").unwrap_or_default();
        let number = href.trim_start_matches("tel:").trim();
        if is_phone_like(number) {
            push_unique(&mut numbers, number);
        }
    }

    for element in document.select(&selectors::SHOWPHONE) {
        let onclick = element.value().attr("onclick").unwrap_or_default();
        if let Some(caps) = patterns::SHOWPHONE.captures(onclick) {
            let number = caps[1].trim();
            if is_phone_like(number) {
                push_unique(&mut numbers, number);
            }
        }
    }

    for element in document.select(&selectors::PHONE_TEXT) {
        let text = strip_text(element);
        for found in patterns::MOBILE.find_iter(&text) {
            push_unique(&mut numbers, &found.as_str().replace(' ', ""));
        }
    }

    numbers
}

fn whatsapp_numbers(document: &Html) -> Vec<String> {
    let mut numbers = Vec::new();

    for link in document.select(&selectors::WHATSAPP_LINK) {
        let href = link.value().attr("href").unwrap_or_default();
        if let Some(caps) = patterns::WHATSAPP.captures(href) {
            let digits = &caps[1];
            let number = if digits.starts_with("90") {
                format!("+{}", digits)
            } else {
                format!("+90{}", digits)
            };
            push_unique(&mut numbers, &number);
        }
    }

    numbers
}

impl ListingParser for EvlerParser {
    fn parse(&self, html: &str, source_file: &str) -> ListingRecord {
        let page = Page::new(html);
        let mut record = ListingRecord::new(source_file);

        record.property_id = page
            .quick_look("İlan No")
            .and_then(|id| non_empty(id.replace('#', "")))
            .or_else(|| property_id_from_filename(source_file));

        record.title = first_of(&page, TITLE);
        record.url = meta_content(&page, &selectors::OG_URL);
        record.agency_name = agency_name(&page);
        record.description = first_of(&page, DESCRIPTION);

        if let Some(kind) = page.quick_look("Emlak Türü") {
            let mut parts = kind.split('/');
            match (parts.next(), parts.next()) {
                (Some(main), Some(sub)) => {
                    record.property_type = non_empty(main.to_string());
                    record.property_subtype = non_empty(sub.to_string());
                }
                _ => record.property_type = Some(kind.clone()),
            }
        }

        record.listing_type = page
            .quick_look("Durumu")
            .and_then(|status| ListingType::from_status(&status));

        if let Some((price, currency)) = page.quick_look("Fiyat").and_then(|v| parse_price(&v)) {
            record.price = Some(price);
            record.currency = Some(currency);
        }

        record.title_deed_type = page.quick_look("Tapu Türü");
        record.exchange_option = page.quick_look("Takas");
        record.min_rental_period = page.quick_look("En Az Kiralama");
        record.payment_interval = page.quick_look("Kira Ödeme Aralığı");
        record.room_count = first_of(&page, ROOM_COUNT);
        record.listing_date = first_of(&page, LISTING_DATE);
        record.update_date = first_of(&page, UPDATE_DATE);

        if let Some(place) = first_of(&page, PLACE) {
            record.district = place.district;
            record.city = place.city;
        }

        // the structured field wins over anything found in prose
        record.area_m2 = page
            .quick_look("Metrekare")
            .and_then(|v| parse_area_field(&v))
            .or_else(|| record.description.as_deref().and_then(parse_area));

        record.image_links = join_values(image_urls(&page.document));
        record.phone_numbers = join_values(phone_numbers(&page.document));
        record.whatsapp_numbers = join_values(whatsapp_numbers(&page.document));
        record.country = Some(self.country.clone());

        debug!(
            "Parsed {} (id={:?}, price={:?} {:?}, area={:?})",
            source_file, record.property_id, record.price, record.currency, record.area_m2
        );

        record
    }

    fn source_name(&self) -> &'static str {
        "101evler"
    }
}
