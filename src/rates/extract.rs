use std::collections::HashSet;

use roxmltree::{Document, Node, NodeType};

use super::ExtractionError;

/// Which nodes a step walks to from its context node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    Name(String),
    Any,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    AttrEquals { name: String, value: String },
    HasAttr(String),
    Position(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

/// A compiled location path such as `ValCurs//Valute[@ID='R01235']/Value`.
///
/// Supports `/` on its own, child (`/`) and descendant-or-self (`//`)
/// steps, name tests, `*`, a trailing `text()`, and `[@attr='v']`,
/// `[@attr]` and `[n]` predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    source: String,
    steps: Vec<Step>,
}

impl PathQuery {
    pub fn compile(query: &str) -> Result<Self, ExtractionError> {
        let fault = |reason: &str| ExtractionError::Query {
            query: query.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(fault("empty query"));
        }
        if trimmed == "/" {
            // The document node itself
            return Ok(Self {
                source: query.to_string(),
                steps: Vec::new(),
            });
        }

        let mut rest = trimmed.strip_prefix('/').map_or(trimmed, |r| {
            // "//x" at the start keeps its descendant meaning
            if r.starts_with('/') {
                trimmed
            } else {
                r
            }
        });

        let mut steps = Vec::new();
        let mut axis = Axis::Child;
        if let Some(r) = rest.strip_prefix("//") {
            axis = Axis::Descendant;
            rest = r;
        }

        loop {
            let (raw, remainder) = split_step(rest).map_err(&fault)?;
            let step = parse_step(raw, axis).map_err(&fault)?;
            if step.test == NodeTest::Text && !remainder.is_empty() {
                return Err(fault("text() must be the last step"));
            }
            steps.push(step);

            if remainder.is_empty() {
                break;
            }
            if let Some(r) = remainder.strip_prefix("//") {
                axis = Axis::Descendant;
                rest = r;
            } else if let Some(r) = remainder.strip_prefix('/') {
                axis = Axis::Child;
                rest = r;
            } else {
                return Err(fault("expected '/' between steps"));
            }
        }

        Ok(Self {
            source: query.to_string(),
            steps,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// String-value of the first node matched in document order, or an
    /// empty string when nothing matches.
    pub fn evaluate(&self, doc: &Document<'_>) -> String {
        let mut context: Vec<Node<'_, '_>> = vec![doc.root()];

        for step in &self.steps {
            let mut seen = HashSet::new();
            let mut next: Vec<Node<'_, '_>> = Vec::new();
            for node in &context {
                // `a//b` is `a/descendant-or-self::node()/child::b`, so
                // positions count among siblings of each parent
                let parents: Vec<Node<'_, '_>> = match step.axis {
                    Axis::Child => vec![*node],
                    Axis::Descendant => node.descendants().collect(),
                };
                for parent in parents {
                    let children = parent.children().filter(|n| step.matches(n)).collect();
                    for found in step.filter(children) {
                        if seen.insert(found.id()) {
                            next.push(found);
                        }
                    }
                }
            }
            next.sort_by_key(|n| n.id().get());
            context = next;
            if context.is_empty() {
                return String::new();
            }
        }

        context.first().map(string_value).unwrap_or_default()
    }
}

impl Step {
    fn matches(&self, node: &Node<'_, '_>) -> bool {
        match &self.test {
            NodeTest::Text => node.node_type() == NodeType::Text,
            NodeTest::Any => node.is_element(),
            NodeTest::Name(name) => node.is_element() && node.tag_name().name() == name,
        }
    }

    fn filter<'a, 'i>(&self, mut nodes: Vec<Node<'a, 'i>>) -> Vec<Node<'a, 'i>> {
        for predicate in &self.predicates {
            nodes = match predicate {
                Predicate::AttrEquals { name, value } => nodes
                    .into_iter()
                    .filter(|n| n.attribute(name.as_str()) == Some(value.as_str()))
                    .collect(),
                Predicate::HasAttr(name) => nodes
                    .into_iter()
                    .filter(|n| n.has_attribute(name.as_str()))
                    .collect(),
                Predicate::Position(pos) => nodes.into_iter().skip(pos - 1).take(1).collect(),
            };
        }
        nodes
    }
}

fn string_value(node: &Node<'_, '_>) -> String {
    match node.node_type() {
        NodeType::Text => node.text().unwrap_or_default().to_string(),
        _ => node
            .descendants()
            .filter(|n| n.is_text())
            .filter_map(|n| n.text())
            .collect(),
    }
}

/// Splits off one step, honouring quotes inside predicates.
fn split_step(input: &str) -> Result<(&str, &str), &'static str> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth = depth.checked_sub(1).ok_or("unbalanced ']'")?;
            }
            (None, '/') if depth == 0 => return Ok((&input[..i], &input[i..])),
            _ => {}
        }
    }

    if quote.is_some() {
        return Err("unterminated string literal");
    }
    if depth != 0 {
        return Err("unterminated predicate");
    }
    Ok((input, ""))
}

fn parse_step(raw: &str, axis: Axis) -> Result<Step, &'static str> {
    let (head, mut preds) = match raw.find('[') {
        Some(i) => (&raw[..i], &raw[i..]),
        None => (raw, ""),
    };

    let test = match head.trim() {
        "" => return Err("empty step"),
        "*" => NodeTest::Any,
        "text()" => NodeTest::Text,
        name if name.chars().all(is_name_char) => NodeTest::Name(name.to_string()),
        _ => return Err("invalid node test"),
    };

    let mut predicates = Vec::new();
    while !preds.is_empty() {
        let inner_end = closing_bracket(preds).ok_or("unterminated predicate")?;
        predicates.push(parse_predicate(preds[1..inner_end].trim())?);
        preds = preds[inner_end + 1..].trim_start();
        if !preds.is_empty() && !preds.starts_with('[') {
            return Err("unexpected characters after predicate");
        }
    }

    Ok(Step {
        axis,
        test,
        predicates,
    })
}

fn closing_bracket(input: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_predicate(inner: &str) -> Result<Predicate, &'static str> {
    if let Some(attr) = inner.strip_prefix('@') {
        return match attr.split_once('=') {
            Some((name, literal)) => {
                let name = name.trim();
                if name.is_empty() || !name.chars().all(is_name_char) {
                    return Err("invalid attribute name");
                }
                Ok(Predicate::AttrEquals {
                    name: name.to_string(),
                    value: unquote(literal.trim())?.to_string(),
                })
            }
            None if !attr.is_empty() && attr.chars().all(is_name_char) => {
                Ok(Predicate::HasAttr(attr.to_string()))
            }
            None => Err("invalid attribute name"),
        };
    }

    match inner.parse::<usize>() {
        Ok(0) => Err("positions start at 1"),
        Ok(pos) => Ok(Predicate::Position(pos)),
        Err(_) => Err("unsupported predicate"),
    }
}

fn unquote(literal: &str) -> Result<&str, &'static str> {
    let quote = literal.chars().next().ok_or("missing literal")?;
    if !matches!(quote, '\'' | '"') || literal.len() < 2 || !literal.ends_with(quote) {
        return Err("attribute value must be a quoted literal");
    }
    Ok(&literal[1..literal.len() - 1])
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

/// Parse `xml` and return the text of the node selected by `query`.
///
/// The text is returned verbatim. A query that matches nothing yields an
/// empty string rather than an error.
pub fn extract_value(xml: &str, query: &str) -> Result<String, ExtractionError> {
    let query = PathQuery::compile(query)?;
    let doc = Document::parse(xml).map_err(ExtractionError::Parse)?;
    Ok(query.evaluate(&doc))
}
