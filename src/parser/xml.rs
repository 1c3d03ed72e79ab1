use std::collections::HashMap;

use log::warn;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::errors::{Error, Result};
use crate::instances::{FeatureKind, FeatureLit, FeatureNode, FeatureTree, Instance, Rule};

/// Minimal element tree, just enough for the FeatureIDE format.
struct Elem {
    name: String,
    attrs: HashMap<String, String>,
    children: Vec<Elem>,
    text: String,
}

impl Elem {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    fn find(&self, name: &str) -> Option<&Elem> {
        self.children.iter().find(|c| c.name == name)
    }
}

fn open_elem(start: &quick_xml::events::BytesStart<'_>) -> Result<Elem> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = HashMap::new();
    for attr in start.attributes() {
        let attr =
            attr.map_err(|e| Error::MalformedInput(format!("invalid xml attribute: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::MalformedInput(format!("invalid xml attribute: {e}")))?
            .into_owned();
        attrs.insert(key, value);
    }
    Ok(Elem {
        name,
        attrs,
        children: Vec::new(),
        text: String::new(),
    })
}

fn read_dom(source: &str) -> Result<Elem> {
    let mut reader = Reader::from_str(source);
    let mut stack: Vec<Elem> = Vec::new();
    let mut root: Option<Elem> = None;

    let malformed = |e: quick_xml::Error| Error::MalformedInput(format!("invalid xml: {e}"));

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(start) => {
                stack.push(open_elem(&start)?);
            }
            Event::Empty(start) => {
                let elem = open_elem(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(elem),
                    None => root = Some(elem),
                }
            }
            Event::End(_) => {
                let elem = stack.pop().ok_or_else(|| {
                    Error::MalformedInput("unbalanced closing tag".to_string())
                })?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(elem),
                    None => root = Some(elem),
                }
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape().map_err(malformed)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    root.ok_or_else(|| Error::MalformedInput("no root element".to_string()))
}

/// Parse a FeatureIDE feature-model XML document.
pub fn parse_xml(source: &str, name: &str) -> Result<Instance> {
    let dom = read_dom(source)?;
    if dom.name != "featureModel" && dom.name != "extendedFeatureModel" {
        return Err(Error::MalformedInput(format!(
            "expected <featureModel> root, found <{}>",
            dom.name
        )));
    }
    let structure = dom
        .find("struct")
        .ok_or_else(|| Error::MalformedInput("missing <struct> element".to_string()))?;
    let roots: Vec<&Elem> = structure
        .children
        .iter()
        .filter(|c| is_feature_tag(&c.name))
        .collect();
    if roots.len() != 1 {
        return Err(Error::MalformedInput(format!(
            "<struct> must contain exactly one feature tree, found {}",
            roots.len()
        )));
    }

    let mut nodes = Vec::new();
    parse_feature(roots[0], &mut nodes)?
        .ok_or_else(|| Error::MalformedInput("empty feature tree".to_string()))?;
    let tree = FeatureTree::from_nodes(nodes);
    let features = tree.concrete_features();

    let mut rules = Vec::new();
    if let Some(constraints) = dom.find("constraints") {
        for rule_elem in constraints.children.iter().filter(|c| c.name == "rule") {
            let exprs: Vec<&Elem> = rule_elem
                .children
                .iter()
                .filter(|c| c.name != "tags")
                .collect();
            if exprs.len() != 1 {
                return Err(Error::MalformedInput(format!(
                    "<rule> must contain exactly one expression, found {}",
                    exprs.len()
                )));
            }
            rules.push(parse_rule(exprs[0])?);
        }
    }

    Ok(Instance::new(name, features, Some(tree), rules))
}

fn is_feature_tag(tag: &str) -> bool {
    matches!(tag, "and" | "or" | "alt" | "feature")
}

/// Recursive descent over the structure tags, pushing children before their
/// parent so the arena stays in post-order.
fn parse_feature(elem: &Elem, nodes: &mut Vec<FeatureNode<String>>) -> Result<Option<usize>> {
    match elem.name.as_str() {
        "description" | "graphics" | "attribute" => return Ok(None),
        tag if is_feature_tag(tag) => {}
        other => {
            return Err(Error::MalformedInput(format!(
                "unknown structure tag <{other}>"
            )))
        }
    }
    let mut children = Vec::new();
    for child in &elem.children {
        if let Some(index) = parse_feature(child, nodes)? {
            children.push(index);
        }
    }
    let mandatory = elem.attr("mandatory") == Some("true");
    let feature_name = elem
        .attr("name")
        .ok_or_else(|| Error::MalformedInput(format!("<{}> without name", elem.name)))?;
    let literal = FeatureLit::new(feature_name.to_string());

    let kind = match elem.name.as_str() {
        "feature" => FeatureKind::Concrete,
        "and" => FeatureKind::And { children },
        "or" | "alt" => {
            // groups have no mandatory children
            for &child in &children {
                if nodes[child].mandatory {
                    warn!(
                        "making mandatory child {} of <{}> {} optional",
                        nodes[child].literal, elem.name, feature_name
                    );
                    nodes[child].mandatory = false;
                }
            }
            if elem.name == "alt" && children.len() == 1 {
                warn!("collapsing <alt> {feature_name} with a single child");
                let child = children[0];
                nodes[child].mandatory = mandatory;
                return Ok(Some(child));
            }
            if elem.name == "or" {
                FeatureKind::Or { children }
            } else {
                FeatureKind::Alt { children }
            }
        }
        _ => unreachable!(),
    };
    nodes.push(FeatureNode {
        literal,
        mandatory,
        kind,
    });
    Ok(Some(nodes.len() - 1))
}

fn parse_rule(elem: &Elem) -> Result<Rule<String>> {
    let children: Vec<Rule<String>> = elem
        .children
        .iter()
        .map(parse_rule)
        .collect::<Result<_>>()?;
    match elem.name.as_str() {
        "conj" => {
            if children.len() == 1 {
                warn!("conjunction with only one operand removed");
                return Ok(children.into_iter().next().unwrap());
            }
            if children.len() < 2 {
                return Err(Error::MalformedInput("empty <conj>".to_string()));
            }
            Ok(Rule::and(children))
        }
        "disj" => {
            if children.len() == 1 {
                warn!("disjunction with only one operand removed");
                return Ok(children.into_iter().next().unwrap());
            }
            if children.len() < 2 {
                return Err(Error::MalformedInput("empty <disj>".to_string()));
            }
            Ok(Rule::or(children))
        }
        "not" => {
            let child = children
                .into_iter()
                .next()
                .ok_or_else(|| Error::MalformedInput("empty <not>".to_string()))?;
            Ok(match child {
                Rule::Var(v) => Rule::Var(v.negate()),
                other => Rule::Not(Box::new(other)),
            })
        }
        "var" => {
            let name = elem.text.trim();
            if name.is_empty() {
                return Err(Error::MalformedInput("<var> without content".to_string()));
            }
            Ok(Rule::var(name.to_string()))
        }
        "imp" => {
            let mut iter = children.into_iter();
            match (iter.next(), iter.next()) {
                (Some(condition), Some(implication)) => {
                    Ok(Rule::Impl(Box::new(condition), Box::new(implication)))
                }
                _ => Err(Error::MalformedInput(
                    "<imp> needs two operands".to_string(),
                )),
            }
        }
        "eq" => {
            let mut iter = children.into_iter();
            match (iter.next(), iter.next()) {
                (Some(a), Some(b)) => Ok(Rule::Eq(Box::new(a), Box::new(b))),
                _ => Err(Error::MalformedInput("<eq> needs two operands".to_string())),
            }
        }
        other => Err(Error::MalformedInput(format!(
            "unknown rule tag <{other}>"
        ))),
    }
}
