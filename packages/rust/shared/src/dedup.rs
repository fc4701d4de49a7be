//! Final deduplication pass shared by every extraction strategy.

use std::collections::HashSet;

use crate::types::ScrapedProduct;

/// Drop later records whose [`ScrapedProduct::dedup_key`] was already seen.
///
/// Stable: the first occurrence of each key survives, in input order.
pub fn dedup_products(products: Vec<ScrapedProduct>) -> Vec<ScrapedProduct> {
    let mut seen: HashSet<String> = HashSet::with_capacity(products.len());
    products
        .into_iter()
        .filter(|p| seen.insert(p.dedup_key().to_string()))
        .collect()
}

/// Deduplicate strings in first-seen order and cap the result.
pub fn dedup_urls<I>(urls: I, cap: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|u| seen.insert(u.clone()))
        .take(cap)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, url: Option<&str>) -> ScrapedProduct {
        let mut p = ScrapedProduct::named(name).expect("named");
        p.source_url = url.map(String::from);
        p
    }

    #[test]
    fn same_source_url_keeps_first() {
        let out = dedup_products(vec![
            product("First", Some("https://a.test/p/1")),
            product("Second", Some("https://a.test/p/1")),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].product_name, "First");
    }

    #[test]
    fn name_is_fallback_key() {
        let out = dedup_products(vec![
            product("Collar", None),
            product("Collar", None),
            product("Collar", Some("https://a.test/collar")),
        ]);
        assert_eq!(out.len(), 2);
        assert!(out[0].source_url.is_none());
        assert_eq!(out[1].source_url.as_deref(), Some("https://a.test/collar"));
    }

    #[test]
    fn output_never_longer_and_keys_unique() {
        let input = vec![
            product("A", Some("https://a.test/1")),
            product("B", Some("https://a.test/2")),
            product("C", Some("https://a.test/1")),
            product("D", None),
            product("D", None),
        ];
        let len_in = input.len();
        let out = dedup_products(input);
        assert!(out.len() <= len_in);

        let keys: HashSet<_> = out.iter().map(|p| p.dedup_key()).collect();
        assert_eq!(keys.len(), out.len());
    }

    #[test]
    fn dedup_urls_caps_and_preserves_order() {
        let urls = vec!["b", "a", "b", "c"].into_iter().map(String::from);
        assert_eq!(dedup_urls(urls.clone(), 10), vec!["b", "a", "c"]);
        assert_eq!(dedup_urls(urls, 2), vec!["b", "a"]);
    }
}
