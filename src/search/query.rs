//! Typed query construction
//!
//! Queries are assembled as a list of clauses first and rendered to the
//! backend format afterwards, so clause selection can be tested on its own.
//! The owner term is added by the builder constructor and cannot be removed.

use crate::core::{model::non_blank, DateRange, OwnerId, PageRequest, SearchDocument, SortOrder};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

const TITLE_WILDCARD_BOOST: f32 = 3.0;
const TITLE_FUZZY_BOOST: f32 = 2.0;
const CONTENT_BOOST: f32 = 1.0;

/// Indexed document fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Owner,
    Title,
    Content,
    LastMessageAt,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Self::Owner => "userId",
            Self::Title => "title",
            Self::Content => "content",
            Self::LastMessageAt => "lastMessageAt",
        }
    }

    /// Text of a full-text field on a document
    pub fn text(self, doc: &SearchDocument) -> &str {
        match self {
            Self::Title => &doc.title,
            Self::Content => &doc.content,
            Self::Owner | Self::LastMessageAt => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Exact match on an integer field
    Term { field: Field, value: i64 },
    /// Case-insensitive containment of `needle` anywhere in the field
    Wildcard {
        field: Field,
        needle: String,
        boost: f32,
    },
    /// Analyzed match with edit-distance tolerance scaled to term length
    Fuzzy {
        field: Field,
        query: String,
        boost: f32,
    },
    /// Inclusive date bounds
    Range {
        field: Field,
        gte: Option<DateTime<Utc>>,
        lte: Option<DateTime<Utc>>,
    },
    /// At least `minimum_should_match` of the nested clauses must hold
    AnyOf {
        clauses: Vec<Clause>,
        minimum_should_match: u32,
    },
}

impl Clause {
    /// Disjunction over title/content substring and fuzzy matches
    pub fn keyword(keyword: &str) -> Self {
        let needle = keyword.to_lowercase();
        Self::AnyOf {
            clauses: vec![
                Self::Wildcard {
                    field: Field::Title,
                    needle: needle.clone(),
                    boost: TITLE_WILDCARD_BOOST,
                },
                Self::Fuzzy {
                    field: Field::Title,
                    query: keyword.to_string(),
                    boost: TITLE_FUZZY_BOOST,
                },
                Self::Wildcard {
                    field: Field::Content,
                    needle,
                    boost: CONTENT_BOOST,
                },
                Self::Fuzzy {
                    field: Field::Content,
                    query: keyword.to_string(),
                    boost: CONTENT_BOOST,
                },
            ],
            minimum_should_match: 1,
        }
    }

    /// Render to Elasticsearch query DSL
    pub fn to_elastic(&self) -> Value {
        match self {
            Self::Term { field, value } => json!({ "term": { field.name(): value } }),
            Self::Wildcard {
                field,
                needle,
                boost,
            } => {
                let mut body = json!({ "value": format!("*{}*", escape_wildcard(needle)) });
                with_boost(&mut body, *boost);
                json!({ "wildcard": { field.name(): body } })
            }
            Self::Fuzzy {
                field,
                query,
                boost,
            } => {
                let mut body = json!({ "query": query, "fuzziness": "AUTO" });
                with_boost(&mut body, *boost);
                json!({ "match": { field.name(): body } })
            }
            Self::Range { field, gte, lte } => {
                let mut bounds = Map::new();
                if let Some(gte) = gte {
                    bounds.insert("gte".into(), Value::String(format_instant(gte)));
                }
                if let Some(lte) = lte {
                    bounds.insert("lte".into(), Value::String(format_instant(lte)));
                }
                json!({ "range": { field.name(): Value::Object(bounds) } })
            }
            Self::AnyOf {
                clauses,
                minimum_should_match,
            } => json!({
                "bool": {
                    "should": clauses.iter().map(Clause::to_elastic).collect::<Vec<_>>(),
                    "minimum_should_match": minimum_should_match,
                }
            }),
        }
    }
}

fn with_boost(body: &mut Value, boost: f32) {
    if (boost - 1.0).abs() > f32::EPSILON {
        body["boost"] = json!(boost);
    }
}

fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Escape wildcard metacharacters so user input only ever matches literally
fn escape_wildcard(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for ch in needle.chars() {
        if matches!(ch, '*' | '?' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// A fully built owner-scoped search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    owner_id: OwnerId,
    must: Vec<Clause>,
    filter: Vec<Clause>,
    sort: SortOrder,
    page: PageRequest,
}

impl SearchQuery {
    pub fn builder(owner_id: OwnerId) -> SearchQueryBuilder {
        SearchQueryBuilder::new(owner_id)
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    /// Scoring clauses; the owner term is always first
    pub fn must(&self) -> &[Clause] {
        &self.must
    }

    /// Non-scoring clauses
    pub fn filter(&self) -> &[Clause] {
        &self.filter
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    pub fn page(&self) -> PageRequest {
        self.page
    }

    pub fn from(&self) -> u64 {
        self.page.offset()
    }

    pub fn size(&self) -> u64 {
        u64::from(self.page.limit)
    }

    /// Full `_search` request body
    pub fn to_elastic(&self) -> Value {
        let sort_field = Field::LastMessageAt.name();
        let order = match self.sort {
            SortOrder::Newest => "desc",
            SortOrder::Oldest => "asc",
        };

        json!({
            "from": self.from(),
            "size": self.size(),
            "query": {
                "bool": {
                    "must": self.must.iter().map(Clause::to_elastic).collect::<Vec<_>>(),
                    "filter": self.filter.iter().map(Clause::to_elastic).collect::<Vec<_>>(),
                }
            },
            "sort": [{ sort_field: { "order": order } }],
        })
    }
}

#[derive(Debug, Clone)]
pub struct SearchQueryBuilder {
    owner_id: OwnerId,
    keyword: Option<String>,
    range: DateRange,
    sort: SortOrder,
    page: PageRequest,
}

impl SearchQueryBuilder {
    pub fn new(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            keyword: None,
            range: DateRange::default(),
            sort: SortOrder::default(),
            page: PageRequest::default(),
        }
    }

    /// Blank keywords are ignored
    pub fn keyword(mut self, keyword: Option<&str>) -> Self {
        self.keyword = non_blank(keyword).map(str::to_string);
        self
    }

    pub fn date_range(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }

    pub fn build(self) -> SearchQuery {
        let mut must = vec![Clause::Term {
            field: Field::Owner,
            value: self.owner_id,
        }];
        if let Some(keyword) = &self.keyword {
            must.push(Clause::keyword(keyword));
        }

        let mut filter = Vec::new();
        if !self.range.is_empty() {
            filter.push(Clause::Range {
                field: Field::LastMessageAt,
                gte: self.range.start,
                lte: self.range.end,
            });
        }

        SearchQuery {
            owner_id: self.owner_id,
            must,
            filter,
            sort: self.sort,
            page: self.page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_owner_term_always_present() {
        let query = SearchQuery::builder(42).build();
        assert_eq!(
            query.must(),
            &[Clause::Term {
                field: Field::Owner,
                value: 42
            }]
        );
        assert!(query.filter().is_empty());
    }

    #[test]
    fn test_blank_keyword_adds_no_clause() {
        let query = SearchQuery::builder(1).keyword(Some("   ")).build();
        assert_eq!(query.must().len(), 1);
    }

    #[test]
    fn test_keyword_clause_boosts() {
        let query = SearchQuery::builder(1).keyword(Some("Da Nang")).build();
        let Clause::AnyOf {
            clauses,
            minimum_should_match,
        } = &query.must()[1]
        else {
            panic!("expected disjunction");
        };

        assert_eq!(*minimum_should_match, 1);
        assert_eq!(
            clauses[0],
            Clause::Wildcard {
                field: Field::Title,
                needle: "da nang".into(),
                boost: 3.0
            }
        );
        assert_eq!(
            clauses[1],
            Clause::Fuzzy {
                field: Field::Title,
                query: "Da Nang".into(),
                boost: 2.0
            }
        );
        assert!(matches!(
            clauses[2],
            Clause::Wildcard {
                field: Field::Content,
                boost,
                ..
            } if boost == 1.0
        ));
        assert!(matches!(
            clauses[3],
            Clause::Fuzzy {
                field: Field::Content,
                ..
            }
        ));
    }

    #[test]
    fn test_date_range_is_a_filter_independent_of_keyword() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let range = DateRange::from_dates(Some(day), None).unwrap();
        let query = SearchQuery::builder(1).date_range(range).build();

        assert_eq!(query.must().len(), 1);
        assert_eq!(
            query.filter(),
            &[Clause::Range {
                field: Field::LastMessageAt,
                gte: range.start,
                lte: None
            }]
        );
    }

    #[test]
    fn test_elastic_body_shape() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let query = SearchQuery::builder(9)
            .keyword(Some("Trip"))
            .date_range(DateRange::from_dates(Some(day), Some(day)).unwrap())
            .sort(SortOrder::Oldest)
            .page(PageRequest::new(3, 20).unwrap())
            .build();

        let body = query.to_elastic();
        assert_eq!(body["from"], 40);
        assert_eq!(body["size"], 20);
        assert_eq!(body["sort"][0]["lastMessageAt"]["order"], "asc");

        let must = &body["query"]["bool"]["must"];
        assert_eq!(must[0]["term"]["userId"], 9);
        let should = &must[1]["bool"]["should"];
        assert_eq!(must[1]["bool"]["minimum_should_match"], 1);
        assert_eq!(should[0]["wildcard"]["title"]["value"], "*trip*");
        assert_eq!(should[0]["wildcard"]["title"]["boost"], 3.0);
        assert_eq!(should[1]["match"]["title"]["fuzziness"], "AUTO");
        assert_eq!(should[1]["match"]["title"]["boost"], 2.0);
        assert!(should[2]["wildcard"]["content"].get("boost").is_none());
        assert_eq!(should[3]["match"]["content"]["query"], "Trip");

        let range = &body["query"]["bool"]["filter"][0]["range"]["lastMessageAt"];
        assert_eq!(range["gte"], "2024-01-05T00:00:00.000Z");
        assert_eq!(range["lte"], "2024-01-05T23:59:59.999Z");
    }

    #[test]
    fn test_default_sort_is_newest_first() {
        let body = SearchQuery::builder(1).build().to_elastic();
        assert_eq!(body["sort"][0]["lastMessageAt"]["order"], "desc");
        assert_eq!(body["from"], 0);
        assert_eq!(body["size"], 10);
    }

    #[test]
    fn test_wildcard_metacharacters_are_escaped() {
        let clause = Clause::Wildcard {
            field: Field::Title,
            needle: "50%*off?".into(),
            boost: 3.0,
        };
        assert_eq!(
            clause.to_elastic()["wildcard"]["title"]["value"],
            "*50%\\*off\\?*"
        );
    }
}
