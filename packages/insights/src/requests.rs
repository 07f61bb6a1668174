//! Expansion of a resolved symbol into its fixed set of insight requests.

use crate::types::request::{Category, RequestDescriptor, TargetSelector};
use crate::types::symbol::{Metadata, Symbol};

const BASE_URL: &str = "https://trendlyne.com/";

/// How a template locates its target on the page.
#[derive(Debug, Clone, Copy)]
pub enum TemplateTarget {
    Document,
    Element {
        attribute: &'static str,
        value: &'static str,
    },
    Attribute(&'static str),
}

impl TemplateTarget {
    fn selector(&self) -> TargetSelector {
        match *self {
            TemplateTarget::Document => TargetSelector::document(),
            TemplateTarget::Element { attribute, value } => TargetSelector::element(attribute, value),
            TemplateTarget::Attribute(attribute) => TargetSelector::attribute(attribute),
        }
    }
}

/// One insight definition. Paths may use `{symbol}`, `{pk}` and `{slug}`.
#[derive(Debug, Clone, Copy)]
pub struct InsightTemplate {
    pub category: Category,
    pub indicator_name: &'static str,
    pub path: &'static str,
    pub target: TemplateTarget,
    pub requires_secondary_parse: bool,
}

/// Every insight fetched per symbol, in output order.
pub const INSIGHT_TEMPLATES: [InsightTemplate; 8] = [
    InsightTemplate {
        category: Category::Valuation,
        indicator_name: "PE",
        path: "tools/buy-sell-zone/{pk}/{symbol}/{slug}/",
        target: TemplateTarget::Element {
            attribute: "class",
            value: "scrolling-wrapper m-l-0 m-r-0 stock-indicator-tile-container",
        },
        requires_secondary_parse: true,
    },
    InsightTemplate {
        category: Category::Valuation,
        indicator_name: "DetailledPE",
        path: "equity/{pk}/{symbol}/",
        target: TemplateTarget::Attribute("data-metrics"),
        requires_secondary_parse: false,
    },
    InsightTemplate {
        category: Category::Valuation,
        indicator_name: "Technical",
        path: "equity/api/stock/adv-technical-analysis/{pk}/24/",
        target: TemplateTarget::Document,
        requires_secondary_parse: false,
    },
    InsightTemplate {
        category: Category::Holdings,
        indicator_name: "MFHoldings",
        path: "equity/monthly-mutual-fund-share-holding/{pk}/{symbol}/latest/{slug}/prune-etf/",
        target: TemplateTarget::Element {
            attribute: "id",
            value: "share-change-analysis",
        },
        requires_secondary_parse: true,
    },
    InsightTemplate {
        category: Category::Holdings,
        indicator_name: "QuaterlyHoldings",
        path: "equity/share-holding/{pk}/{symbol}/latest/{slug}/",
        target: TemplateTarget::Element {
            attribute: "class",
            value: "list-group list-group-mbdr gray666 fs09rem",
        },
        requires_secondary_parse: true,
    },
    InsightTemplate {
        category: Category::Deals,
        indicator_name: "Bulk/Block Deals",
        path: "equity/bulk-block-deals/{symbol}/{pk}/{slug}/",
        target: TemplateTarget::Element {
            attribute: "class",
            value: "card-block",
        },
        requires_secondary_parse: true,
    },
    InsightTemplate {
        category: Category::Deals,
        indicator_name: "Insider/SAST Deals",
        path: "equity/insider-trading-sast/all/{symbol}/{pk}/{slug}/",
        target: TemplateTarget::Element {
            attribute: "class",
            value: "tlcard p-a-1 m-b-2",
        },
        requires_secondary_parse: true,
    },
    InsightTemplate {
        category: Category::Financials,
        indicator_name: "FinancialInsights",
        path: "fundamentals/financials/{pk}/{symbol}/{slug}/",
        target: TemplateTarget::Attribute("data-stock-insight"),
        requires_secondary_parse: false,
    },
];

/// Build the descriptors for a resolved symbol.
///
/// Pure and deterministic: same inputs, same descriptors, same order.
pub fn build(symbol: &Symbol, metadata: &Metadata) -> Vec<RequestDescriptor> {
    INSIGHT_TEMPLATES
        .iter()
        .map(|template| RequestDescriptor {
            category: template.category,
            indicator_name: template.indicator_name.to_string(),
            url: format!(
                "{BASE_URL}{}",
                substitute(template.path, symbol.as_str(), &metadata.pk, &metadata.slug)
            ),
            target: template.target.selector(),
            requires_secondary_parse: template.requires_secondary_parse,
        })
        .collect()
}

/// Replace every placeholder in a single left-to-right pass.
///
/// Substituted values are copied verbatim and never re-scanned, so a slug
/// containing `{pk}` stays literal. Unknown `{...}` sequences are kept.
pub fn substitute(template: &str, symbol: &str, pk: &str, slug: &str) -> String {
    let mut out = String::with_capacity(template.len() + symbol.len() + pk.len() + slug.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let replacement = [("{symbol}", symbol), ("{pk}", pk), ("{slug}", slug)]
            .into_iter()
            .find(|(placeholder, _)| tail.starts_with(placeholder));
        match replacement {
            Some((placeholder, value)) => {
                out.push_str(value);
                rest = &tail[placeholder.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
