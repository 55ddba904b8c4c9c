//! Search request descriptors
//!
//! Queries are built as typed values and rendered to the cluster's JSON
//! query DSL by [`Query::to_json`] and [`SearchRequest::to_body`]. The
//! in-memory backend evaluates the same values directly with
//! [`Query::matches`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Sort order for search results
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// Field to sort by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSort {
    pub field: String,
    pub order: SortOrder,
}

/// Sum of a numeric field over every matching document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumAggregation {
    pub name: String,
    pub field: String,
}

/// A query clause
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    MatchAll,

    /// Full-text query over the given fields; terms are ANDed unless joined
    /// by `OR`. In memory, grouping parentheses, wildcards and fuzziness
    /// are not supported and phrases match as their words in any order.
    QueryString { query: String, fields: Vec<String> },

    /// Exact value match
    Term { field: String, value: Value },

    /// Numeric field strictly greater than `value`
    RangeGt { field: String, value: i64 },

    /// Every clause must match
    Bool { must: Vec<Query> },

    /// Wraps a query and scores its matches with a seeded random function
    RandomScore { query: Box<Query>, seed: u64 },
}

impl Query {
    pub fn query_string(query: impl Into<String>, fields: &[&str]) -> Self {
        Query::QueryString {
            query: query.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn range_gt(field: impl Into<String>, value: i64) -> Self {
        Query::RangeGt {
            field: field.into(),
            value,
        }
    }

    pub fn all_of(must: Vec<Query>) -> Self {
        Query::Bool { must }
    }

    pub fn random(query: Query, seed: u64) -> Self {
        Query::RandomScore {
            query: Box::new(query),
            seed,
        }
    }

    /// Render as the cluster's query DSL
    pub fn to_json(&self) -> Value {
        match self {
            Query::MatchAll => json!({ "match_all": {} }),
            Query::QueryString { query, fields } => json!({
                "query_string": {
                    "query": query,
                    "fields": fields,
                    "default_operator": "AND"
                }
            }),
            Query::Term { field, value } => json!({ "term": { field: value } }),
            Query::RangeGt { field, value } => json!({ "range": { field: { "gt": value } } }),
            Query::Bool { must } => json!({
                "bool": {
                    "must": must.iter().map(Query::to_json).collect::<Vec<_>>()
                }
            }),
            Query::RandomScore { query, seed } => json!({
                "function_score": {
                    "query": query.to_json(),
                    "random_score": { "seed": seed, "field": "_id" }
                }
            }),
        }
    }

    /// Evaluate against a document source
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Query::MatchAll => true,
            Query::QueryString { query, fields } => parse_query_string(query)
                .iter()
                .all(|alternatives| alternatives.iter().any(|term| term.matches(doc, fields))),
            Query::Term { field, value } => match lookup(doc, field) {
                Some(Value::Array(items)) => items.iter().any(|item| item == value),
                Some(found) => found == value,
                None => false,
            },
            Query::RangeGt { field, value } => lookup(doc, field)
                .and_then(Value::as_f64)
                .map(|n| n > *value as f64)
                .unwrap_or(false),
            Query::Bool { must } => must.iter().all(|clause| clause.matches(doc)),
            Query::RandomScore { query, .. } => query.matches(doc),
        }
    }

    /// Seed of a top-level random scoring wrapper
    pub fn random_seed(&self) -> Option<u64> {
        match self {
            Query::RandomScore { seed, .. } => Some(*seed),
            _ => None,
        }
    }
}

/// A paginated search with optional sorting, sums and source filtering
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: Query,
    pub size: usize,
    pub from: usize,
    pub sort: Option<SearchSort>,
    pub sums: Vec<SumAggregation>,
    /// Source fields to return; `None` returns whole documents
    pub source: Option<Vec<String>>,
}

impl SearchRequest {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            size: 10,
            from: 0,
            sort: None,
            sums: Vec::new(),
            source: None,
        }
    }

    pub fn with_page(mut self, size: usize, from: usize) -> Self {
        self.size = size;
        self.from = from;
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(SearchSort {
            field: field.into(),
            order,
        });
        self
    }

    /// Sort by scan completion time, newest first
    pub fn newest_first(self) -> Self {
        self.with_sort("ctime", SortOrder::Descending)
    }

    pub fn with_sum(mut self, name: impl Into<String>, field: impl Into<String>) -> Self {
        self.sums.push(SumAggregation {
            name: name.into(),
            field: field.into(),
        });
        self
    }

    pub fn with_source(mut self, fields: &[&str]) -> Self {
        self.source = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Render the `_search` request body
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("size".into(), json!(self.size));
        body.insert("from".into(), json!(self.from));
        body.insert("query".into(), self.query.to_json());
        body.insert("track_total_hits".into(), Value::Bool(true));

        if let Some(sort) = &self.sort {
            body.insert(
                "sort".into(),
                json!([{ sort.field.as_str(): { "order": sort.order.as_str() } }]),
            );
        }

        if !self.sums.is_empty() {
            let aggs: Map<String, Value> = self
                .sums
                .iter()
                .map(|agg| (agg.name.clone(), json!({ "sum": { "field": agg.field } })))
                .collect();
            body.insert("aggs".into(), Value::Object(aggs));
        }

        if let Some(fields) = &self.source {
            body.insert("_source".into(), json!(fields));
            body.insert("track_scores".into(), Value::Bool(false));
        }

        Value::Object(body)
    }
}

/// Resolve a dotted field path inside a document
pub fn lookup<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(doc, |current, part| current.as_object()?.get(part))
}

/// Lower-cased terms, split on whitespace and punctuation other than the
/// characters that hold addresses and versions together
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || matches!(c, '.' | ':' | '-' | '_')))
        .map(|t| t.trim_start_matches('.').trim_end_matches(['.', ':']))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// One operand of a query string: a word, a quoted phrase or a
/// `field:value` pair, possibly negated
#[derive(Debug, Clone, PartialEq)]
struct QueryTerm {
    field: Option<String>,
    tokens: Vec<String>,
    negated: bool,
}

impl QueryTerm {
    fn parse(raw: &str, negated: bool) -> Self {
        let (field, value) = match raw.split_once(':') {
            Some((name, value)) if is_field_name(name) && !value.is_empty() => {
                (Some(name.to_string()), value)
            }
            _ => (None, raw),
        };

        Self {
            field,
            tokens: tokenize(value.trim_matches('"')),
            negated,
        }
    }

    /// Phrases are approximated as "every word present"
    fn matches(&self, doc: &Value, default_fields: &[String]) -> bool {
        let mut present = Vec::new();
        match &self.field {
            Some(field) => {
                if let Some(value) = lookup(doc, field) {
                    collect_tokens(value, &mut present);
                }
            }
            None => {
                for field in default_fields {
                    if let Some(value) = lookup(doc, field) {
                        collect_tokens(value, &mut present);
                    }
                }
            }
        }

        let found = self.tokens.iter().all(|token| present.contains(token));
        found != self.negated
    }
}

/// Field prefixes start with a letter, which keeps IPv6 addresses such as
/// `fe80::1` from being read as `field:value`
fn is_field_name(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphabetic() || matches!(c, '_' | '.'))
}

/// Split on whitespace outside double quotes
fn split_operands(query: &str) -> Vec<String> {
    let mut operands = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in query.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    operands.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        operands.push(current);
    }
    operands
}

/// Parse a query string into clauses that must all hold, each a list of
/// alternatives joined by `OR`. Terms are ANDed by default; `NOT`, `-` and
/// `!` negate the next term and `+` is accepted and ignored.
fn parse_query_string(query: &str) -> Vec<Vec<QueryTerm>> {
    let mut clauses: Vec<Vec<QueryTerm>> = Vec::new();
    let mut join_previous = false;
    let mut negate_next = false;

    for operand in split_operands(query) {
        match operand.as_str() {
            "AND" | "&&" => continue,
            "OR" | "||" => {
                join_previous = true;
                continue;
            }
            "NOT" | "!" => {
                negate_next = true;
                continue;
            }
            _ => {}
        }

        let (negated, body) = match operand.strip_prefix(['-', '!']) {
            Some(rest) => (true, rest),
            None => (false, operand.strip_prefix('+').unwrap_or(&operand)),
        };

        let term = QueryTerm::parse(body, negated || negate_next);
        negate_next = false;
        if term.tokens.is_empty() {
            continue;
        }

        match clauses.last_mut() {
            Some(previous) if join_previous => previous.push(term),
            _ => clauses.push(vec![term]),
        }
        join_previous = false;
    }

    clauses
}

fn collect_tokens(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.extend(tokenize(s)),
        Value::Number(n) => out.push(n.to_string()),
        Value::Bool(b) => out.push(b.to_string()),
        Value::Array(items) => items.iter().for_each(|item| collect_tokens(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_tokens(item, out)),
        Value::Null => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_doc() -> Value {
        json!({
            "ip": "10.0.0.1",
            "scan_id": "s1",
            "is_up": true,
            "port_count": 3,
            "nmap_data": "22/tcp open ssh OpenSSH 7.4\n80/tcp open http nginx",
            "screenshots": [{ "service": "HTTP", "port": 80 }]
        })
    }

    #[test]
    fn test_search_body_shape() {
        let request = SearchRequest::new(Query::all_of(vec![
            Query::query_string("ssh", &["nmap_data"]),
            Query::term("is_up", true),
            Query::range_gt("port_count", 0),
        ]))
        .with_page(20, 40)
        .newest_first();

        let body = request.to_body();
        assert_eq!(body["size"], 20);
        assert_eq!(body["from"], 40);
        assert_eq!(body["sort"][0]["ctime"]["order"], "desc");

        let must = &body["query"]["bool"]["must"];
        assert_eq!(must[0]["query_string"]["fields"][0], "nmap_data");
        assert_eq!(must[0]["query_string"]["default_operator"], "AND");
        assert_eq!(must[1]["term"]["is_up"], true);
        assert_eq!(must[2]["range"]["port_count"]["gt"], 0);
        assert!(body.get("aggs").is_none());
        assert!(body.get("_source").is_none());
    }

    #[test]
    fn test_aggregation_and_source_body() {
        let body = SearchRequest::new(Query::range_gt("num_screenshots", 0))
            .with_sum("screenshot_count", "num_screenshots")
            .with_source(&["screenshots", "ctime", "scan_id"])
            .to_body();

        assert_eq!(body["aggs"]["screenshot_count"]["sum"]["field"], "num_screenshots");
        assert_eq!(body["_source"], json!(["screenshots", "ctime", "scan_id"]));
    }

    #[test]
    fn test_random_score_body() {
        let query = Query::random(Query::term("is_up", true), 42);
        let body = query.to_json();
        assert_eq!(body["function_score"]["random_score"]["seed"], 42);
        assert_eq!(body["function_score"]["random_score"]["field"], "_id");
        assert_eq!(query.random_seed(), Some(42));
        assert_eq!(Query::MatchAll.random_seed(), None);
    }

    #[test]
    fn test_query_string_requires_every_term() {
        let doc = host_doc();
        assert!(Query::query_string("ssh", &["nmap_data"]).matches(&doc));
        assert!(Query::query_string("OpenSSH nginx", &["nmap_data"]).matches(&doc));
        assert!(!Query::query_string("ssh telnet", &["nmap_data"]).matches(&doc));
        assert!(!Query::query_string("ssh", &["ip"]).matches(&doc));
    }

    #[test]
    fn test_addresses_do_not_match_prefixes() {
        let doc = host_doc();
        assert!(Query::query_string("10.0.0.1", &["ip"]).matches(&doc));
        assert!(!Query::query_string("10.0.0.10", &["ip"]).matches(&doc));
        assert!(Query::term("ip", "10.0.0.1").matches(&doc));
        assert!(!Query::term("ip", "10.0.0.10").matches(&doc));
    }

    #[test]
    fn test_term_range_and_bool() {
        let doc = host_doc();
        assert!(Query::range_gt("port_count", 0).matches(&doc));
        assert!(!Query::range_gt("port_count", 3).matches(&doc));
        assert!(!Query::range_gt("missing", 0).matches(&doc));
        assert!(Query::term("screenshots.service", "HTTP").matches(&json!({
            "screenshots": { "service": "HTTP" }
        })));

        let both = Query::all_of(vec![Query::term("is_up", true), Query::term("scan_id", "s2")]);
        assert!(!both.matches(&doc));
        assert!(Query::all_of(vec![]).matches(&doc));
    }

    #[test]
    fn test_query_string_operators() {
        let doc = host_doc();
        let matches = |q: &str| Query::query_string(q, &["nmap_data"]).matches(&doc);

        assert!(matches("telnet OR ssh"));
        assert!(matches("ssh AND nginx"));
        assert!(!matches("telnet OR rdp"));
        assert!(!matches("ssh NOT nginx"));
        assert!(!matches("ssh -nginx"));
        assert!(matches("ssh -telnet"));
        assert!(matches("+ssh"));
        assert!(matches("\"open ssh\""));
        assert!(!matches("\"open telnet\""));
    }

    #[test]
    fn test_query_string_field_prefix() {
        let doc = host_doc();
        assert!(Query::query_string("ip:10.0.0.1", &["nmap_data"]).matches(&doc));
        assert!(!Query::query_string("ip:10.0.0.2", &["nmap_data"]).matches(&doc));
        assert!(Query::query_string("nmap_data:\"open http\"", &["ip"]).matches(&doc));

        let v6 = json!({ "nmap_data": "host fe80::1 is up" });
        assert!(Query::query_string("fe80::1", &["nmap_data"]).matches(&v6));
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("22/tcp open ssh"), vec!["22", "tcp", "open", "ssh"]);
        assert_eq!(tokenize("Host: 10.0.0.1."), vec!["host", "10.0.0.1"]);
    }
}
