//! Maps raw items onto the canonical `Article`.
//!
//! Everything here is pure: no storage, no network, the clock is passed in.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tw_core::{Article, ArticleStatus, Category, Engagement, Error, RawItem, Result};
use url::Url;

pub const SUMMARY_CHARS: usize = 200;
pub const MAX_IMAGES: usize = 3;
pub const UNTITLED: &str = "Untitled";
pub const UNKNOWN_AUTHOR: &str = "Unknown";

pub const TITLE: &[&str] = &["title", "标题", "Title"];
pub const CONTENT: &[&str] = &["content", "内容", "Content", "description"];
pub const SUMMARY: &[&str] = &["summary", "摘要", "Summary"];
pub const AUTHOR: &[&str] = &["author", "作者", "Author", "creator"];
pub const URL: &[&str] = &["url", "originalUrl", "original_url", "链接", "URL", "Url", "link", "guid"];
pub const PUBLISHED_AT: &[&str] = &[
    "published_at",
    "publishedAt",
    "发布时间",
    "Published At",
    "Published",
    "pubDate",
];
pub const IMAGES: &[&str] = &["images", "imageUrls", "image_urls", "图片", "Images"];
pub const TAGS: &[&str] = &["tags", "标签", "Tags"];
pub const CATEGORY: &[&str] = &["category", "分类", "Category"];
pub const PLATFORM: &[&str] = &["platform", "平台", "Platform"];
pub const LIKES: &[&str] = &["likes", "点赞", "Likes"];
pub const SHARES: &[&str] = &["shares", "分享", "Shares"];
pub const COMMENTS: &[&str] = &["comments", "评论", "Comments"];
pub const VIEWS: &[&str] = &["views", "播放量", "Views"];

/// Terms that become tags when they occur in the title or content.
pub const TAG_VOCABULARY: &[&str] = &[
    "labubu",
    "lisa",
    "blackpink",
    "盲盒",
    "手办",
    "popmart",
    "pop mart",
    "blind box",
    "limited edition",
    "收藏",
    "限量",
    "新品",
    "发布",
    "穿搭",
    "明星",
    "同款",
    "价格",
    "涨价",
    "暴涨",
    "拍卖",
    "定制",
    "改款",
];

/// First matching rule wins.
const CATEGORY_RULES: &[(&[&str], Category)] = &[
    (&["lisa", "blackpink", "明星", "同款"], Category::Celebrity),
    (&["新品", "发布", "上市", "new release", "launch"], Category::NewRelease),
    (&["活动", "展览", "快闪", "exhibition", "pop-up"], Category::Event),
    (&["开箱", "评测", "测评", "unboxing", "review"], Category::Review),
    (&["收藏", "攻略", "指南", "collection", "collector"], Category::Collecting),
    (&["穿搭", "造型", "搭配", "outfit"], Category::Outfit),
    (&["艺术", "创作", "设计", "artist", "artwork"], Category::Art),
    (&["价格", "涨价", "暴涨", "拍卖", "price", "resale", "auction"], Category::Market),
    (&["小红书", "微博", "抖音", "instagram", "tiktok"], Category::Social),
];

/// Category labels used by the content team's spreadsheets.
const CATEGORY_LABELS: &[(&str, Category)] = &[
    ("明星动态", Category::Celebrity),
    ("新品发布", Category::NewRelease),
    ("活动预告", Category::Event),
    ("开箱评测", Category::Review),
    ("收藏攻略", Category::Collecting),
    ("穿搭分享", Category::Outfit),
    ("艺术创作", Category::Art),
    ("市场动态", Category::Market),
    ("社交热议", Category::Social),
    ("其他资讯", Category::Other),
];

static IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img\b[^>]*\ssrc=["']([^"'>]+)["']"#).expect("Invalid img regex"));

/// Per-source defaults applied while normalizing.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    pub platform: &'a str,
    pub status: ArticleStatus,
    pub now: DateTime<Utc>,
}

/// Builds an article from a raw item. The hot score is left at zero for the
/// scoring step. Fails when the item has no usable absolute URL or carries an
/// unreadable publication date.
pub fn normalize(item: &RawItem, ctx: &NormalizeContext<'_>) -> Result<Article> {
    let original_url = canonical_url(item.first_text(URL).as_deref())?;
    let title = item.first_text(TITLE).unwrap_or_else(|| UNTITLED.to_string());
    let content = item.first_text(CONTENT).unwrap_or_default();
    let summary = match item.first_text(SUMMARY) {
        Some(summary) => strip_markup(&summary),
        None => summarize(&content),
    };
    let published_at = match item.first_text(PUBLISHED_AT) {
        Some(raw) => parse_published_at(&raw)?,
        None => ctx.now,
    };

    let haystack = format!("{} {}", title, content).to_lowercase();
    let mut tags: BTreeSet<String> = item
        .first_list(TAGS)
        .into_iter()
        .map(|tag| tag.trim().trim_start_matches('#').to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect();
    tags.extend(extract_tags(&haystack));

    let category = item
        .first_text(CATEGORY)
        .and_then(|label| category_from_label(&label))
        .unwrap_or_else(|| infer_category(&haystack));

    Ok(Article {
        image_urls: collect_images(&item.first_list(IMAGES), &content),
        author: item
            .first_text(AUTHOR)
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
        platform: item
            .first_text(PLATFORM)
            .unwrap_or_else(|| ctx.platform.to_string()),
        engagement: Engagement {
            likes: item.first_count(LIKES).unwrap_or(0),
            shares: item.first_count(SHARES).unwrap_or(0),
            comments: item.first_count(COMMENTS).unwrap_or(0),
            views: item.first_count(VIEWS).unwrap_or(0),
        },
        title,
        content,
        summary,
        original_url,
        published_at,
        tags,
        category,
        hot_score: 0.0,
        status: ctx.status,
    })
}

pub fn canonical_url(raw: Option<&str>) -> Result<String> {
    let raw = raw
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| Error::InvalidUrl("missing original url".to_string()))?;
    let url = Url::parse(raw).map_err(|e| Error::InvalidUrl(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url.to_string()),
        _ => Err(Error::InvalidUrl(format!("not an absolute web url: {}", raw))),
    }
}

/// Accepts RFC 3339, RFC 2822 (feed `pubDate`), `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DDTHH:MM:SS` (read as UTC), bare dates and epoch milliseconds.
pub fn parse_published_at(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_rfc2822(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y/%m/%d %H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Utc.from_utc_datetime(&t));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(t) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&t));
        }
    }
    if let Some(t) = raw.parse::<i64>().ok().and_then(|ms| Utc.timestamp_millis_opt(ms).single()) {
        return Ok(t);
    }
    Err(Error::Parse(format!("unreadable publication date: {}", raw)))
}

/// Text content of a markup fragment with whitespace collapsed.
pub fn strip_markup(markup: &str) -> String {
    let fragment = Html::parse_fragment(markup);
    let text: String = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn summarize(content: &str) -> String {
    let text = strip_markup(content);
    if text.chars().count() > SUMMARY_CHARS {
        let mut summary: String = text.chars().take(SUMMARY_CHARS).collect();
        summary.push_str("...");
        summary
    } else {
        text
    }
}

fn image_url(src: &str) -> Option<String> {
    let src = src.trim();
    if let Some(rest) = src.strip_prefix("//") {
        return Some(format!("https://{}", rest));
    }
    (src.starts_with("http://") || src.starts_with("https://")).then(|| src.to_string())
}

/// Explicit images first, then `<img src>` references in document order.
/// Deduplicated, at most `MAX_IMAGES`.
pub fn collect_images(explicit: &[String], content: &str) -> Vec<String> {
    let embedded = IMG_SRC
        .captures_iter(content)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str().to_string());

    let mut images: Vec<String> = Vec::new();
    for src in explicit.iter().cloned().chain(embedded) {
        if images.len() == MAX_IMAGES {
            break;
        }
        if let Some(url) = image_url(&src) {
            if !images.contains(&url) {
                images.push(url);
            }
        }
    }
    images
}

/// Vocabulary terms present in an already lowercased text.
pub fn extract_tags(haystack: &str) -> BTreeSet<String> {
    TAG_VOCABULARY
        .iter()
        .filter(|term| haystack.contains(*term))
        .map(|term| term.to_string())
        .collect()
}

pub fn infer_category(haystack: &str) -> Category {
    CATEGORY_RULES
        .iter()
        .find(|(terms, _)| terms.iter().any(|term| haystack.contains(term)))
        .map_or(Category::Other, |(_, category)| *category)
}

fn category_from_label(label: &str) -> Option<Category> {
    Category::from_str(label).ok().or_else(|| {
        CATEGORY_LABELS
            .iter()
            .find(|(name, _)| *name == label.trim())
            .map(|(_, category)| *category)
    })
}
