//! Decides which events an action describes.
//!
//! An action matches an event when any of its steps does. A step matches when every
//! populated field agrees with the event: the event name, the current url (exact,
//! case-insensitive substring or regex) and the element chain (CSS-like selector,
//! tag name, text, href).

use std::collections::{BTreeMap, HashMap};
use std::iter::Peekable;
use std::str::Chars;

use regex::Regex;
use serde_json::Value;

use crate::models::{Action, ActionStep, Element, Event, UrlMatching};

pub fn action_matches(action: &Action, event: &Event) -> bool {
    action.steps.iter().any(|step| step_matches(step, event))
}

pub fn count_matching(action: &Action, events: &[Event]) -> i64 {
    events.iter().filter(|e| action_matches(action, e)).count() as i64
}

pub fn step_matches(step: &ActionStep, event: &Event) -> bool {
    if let Some(name) = &step.event {
        if name != &event.event {
            return false;
        }
    }

    if let Some(url) = &step.url {
        let Some(current_url) = event.current_url() else {
            return false;
        };
        if !url_matches(url, step.url_matching, current_url) {
            return false;
        }
    }

    let mut elements: Vec<&Element> = event.elements.iter().collect();
    elements.sort_by_key(|e| e.order);

    if let Some(selector) = &step.selector {
        match Selector::parse(selector) {
            Some(selector) if selector.matches(&elements) => {}
            _ => return false,
        }
    }

    if step.tag_name.is_some() || step.text.is_some() || step.href.is_some() {
        let found = elements.iter().any(|element| {
            step.tag_name
                .as_ref()
                .map_or(true, |tag| &element.tag_name == tag)
                && step
                    .text
                    .as_ref()
                    .map_or(true, |text| element.text.as_ref() == Some(text))
                && step
                    .href
                    .as_ref()
                    .map_or(true, |href| element.href.as_ref() == Some(href))
        });
        if !found {
            return false;
        }
    }

    true
}

fn url_matches(pattern: &str, matching: UrlMatching, url: &str) -> bool {
    match matching {
        UrlMatching::Exact => pattern == url,
        UrlMatching::Contains => url.to_lowercase().contains(&pattern.to_lowercase()),
        UrlMatching::Regex => Regex::new(pattern).map_or(false, |re| re.is_match(url)),
    }
}

#[derive(Debug, Default, PartialEq)]
struct SelectorPart {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
    /// Set when the part was preceded by `>`.
    direct_child: bool,
}

/// Consumes characters up to the next class, id or attribute marker.
fn take_name(chars: &mut Peekable<Chars<'_>>) -> String {
    std::iter::from_fn(|| chars.next_if(|c| !matches!(*c, '.' | '#' | '['))).collect()
}

impl SelectorPart {
    fn parse(token: &str) -> Option<SelectorPart> {
        let mut part = SelectorPart::default();
        let mut chars = token.chars().peekable();

        let tag = take_name(&mut chars);
        if !tag.is_empty() && tag != "*" {
            part.tag = Some(tag);
        }

        while let Some(marker) = chars.next() {
            match marker {
                '.' | '#' => {
                    let name = take_name(&mut chars);
                    if name.is_empty() {
                        return None;
                    }
                    if marker == '.' {
                        part.classes.push(name);
                    } else {
                        part.id = Some(name);
                    }
                }
                '[' => {
                    let body: String =
                        std::iter::from_fn(|| chars.next_if(|c| *c != ']')).collect();
                    chars.next()?;
                    let (name, value) = match body.split_once('=') {
                        Some((name, value)) => {
                            let value = value.trim().trim_matches(|c: char| c == '"' || c == '\'');
                            (name.trim().to_owned(), Some(value.to_owned()))
                        }
                        None => (body.trim().to_owned(), None),
                    };
                    if name.is_empty() {
                        return None;
                    }
                    part.attributes.push((name, value));
                }
                _ => return None,
            }
        }

        Some(part)
    }

    fn matches(&self, element: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if &element.tag_name != tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.attr_id.as_ref() != Some(id) {
                return false;
            }
        }
        if !self
            .classes
            .iter()
            .all(|class| element.attr_class.contains(class))
        {
            return false;
        }
        self.attributes.iter().all(|(name, expected)| {
            let actual = element
                .attributes
                .get(name)
                .or_else(|| element.attributes.get(format!("attr__{name}")));
            match (actual, expected) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(Value::String(actual)), Some(expected)) => actual == expected,
                (Some(actual), Some(expected)) => &actual.to_string() == expected,
            }
        })
    }
}

#[derive(Debug, PartialEq)]
struct Selector {
    parts: Vec<SelectorPart>,
}

impl Selector {
    fn parse(selector: &str) -> Option<Selector> {
        let spaced = selector.replace('>', " > ");
        let mut parts = Vec::new();
        let mut direct_child = false;

        for token in spaced.split_whitespace() {
            if token == ">" {
                direct_child = true;
                continue;
            }
            let mut part = SelectorPart::parse(token)?;
            part.direct_child = direct_child;
            direct_child = false;
            parts.push(part);
        }

        if parts.is_empty() || direct_child || parts[0].direct_child {
            return None;
        }
        Some(Selector { parts })
    }

    /// `elements` must be sorted by order, the clicked element first.
    fn matches(&self, elements: &[&Element]) -> bool {
        let last = self.parts.len() - 1;
        (0..elements.len()).any(|index| self.matches_from(last, index, elements))
    }

    fn matches_from(&self, part: usize, index: usize, elements: &[&Element]) -> bool {
        if !self.parts[part].matches(elements[index]) {
            return false;
        }
        if part == 0 {
            return true;
        }
        if self.parts[part].direct_child {
            index + 1 < elements.len() && self.matches_from(part - 1, index + 1, elements)
        } else {
            (index + 1..elements.len())
                .any(|ancestor| self.matches_from(part - 1, ancestor, elements))
        }
    }
}

/// Number of people reaching each step of a funnel.
///
/// Events are walked in timestamp order per distinct id. A person reaches step `n`
/// once they performed the actions of steps `0..=n` in that order.
pub fn funnel_step_counts(actions: &[Action], events: &[Event]) -> Vec<i64> {
    let mut by_person: HashMap<&str, Vec<&Event>> = HashMap::new();
    for event in events {
        by_person
            .entry(event.distinct_id.as_str())
            .or_default()
            .push(event);
    }

    let mut reached: BTreeMap<usize, i64> = BTreeMap::new();
    for person_events in by_person.values_mut() {
        person_events.sort_by_key(|e| (e.timestamp, e.id));

        let mut step = 0;
        for event in person_events.iter() {
            if step < actions.len() && action_matches(&actions[step], event) {
                step += 1;
            }
        }
        *reached.entry(step).or_default() += 1;
    }

    (0..actions.len())
        .map(|step| reached.range(step + 1..).map(|(_, count)| count).sum::<i64>())
        .collect()
}
