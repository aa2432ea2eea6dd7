//! Readers for network data files in TNTP format.
//!
//! Three kinds of files are supported:
//!
//! - `*_net.tntp`: metadata block ending with `<END OF METADATA>`, then one link per line with ten fields
//!   `init_node term_node capacity length free_flow_time b power speed_limit toll link_type` followed by `;`.
//! - `*_trips.tntp`: metadata block, then `Origin k` headers each followed by `destination : demand;` entries.
//! - `*_flow.tntp`: reference solution, one `from to volume cost` row per link.
//!
//! Lines starting with `~` are comments. Node numbers in files are 1-based.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::demand::DemandMatrix;
use crate::error::NetworkError;
use crate::link::LinkRecord;
use crate::solution::{KnownSolution, LinkFlow};

const END_OF_METADATA: &str = "<END OF METADATA>";

/// Contents of a network file.
#[derive(Clone, Debug, Default)]
pub struct NetworkData {
    /// Number of nodes, from metadata or the largest node number.
    pub node_count: usize,
    /// Number of zones declared in metadata.
    pub zone_count: Option<usize>,
    /// Links in file order.
    pub links: Vec<LinkRecord>,
}

fn open(path: &Path) -> Result<BufReader<File>, NetworkError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| NetworkError::File {
            path: path.to_path_buf(),
            source,
        })
}

fn parse_error(line: usize, message: impl Into<String>) -> NetworkError {
    NetworkError::Parse {
        line,
        message: message.into(),
    }
}

fn parse_number<T: std::str::FromStr>(token: &str, line: usize, what: &str) -> Result<T, NetworkError> {
    token
        .trim()
        .parse()
        .map_err(|_| parse_error(line, format!("invalid {what} '{}'", token.trim())))
}

/// Metadata values and the remaining data lines with their numbers.
struct Sections {
    metadata: Vec<(String, String)>,
    lines: Vec<(usize, String)>,
}

impl Sections {
    fn metadata_value(&self, tag: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(tag))
            .map(|(_, value)| value.as_str())
    }

    fn metadata_count(&self, tag: &str) -> Result<Option<usize>, NetworkError> {
        self.metadata_value(tag)
            .map(|value| parse_number(value, 0, tag))
            .transpose()
    }
}

fn split_sections<R: BufRead>(reader: R) -> Result<Sections, NetworkError> {
    let mut sections = Sections {
        metadata: Vec::new(),
        lines: Vec::new(),
    };
    let mut in_metadata = true;
    let mut raw_lines = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        raw_lines.push((index + 1, line?));
    }
    // files without metadata block start with data right away
    if !raw_lines.iter().any(|(_, line)| line.trim() == END_OF_METADATA) {
        in_metadata = false;
    }
    for (number, line) in raw_lines {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('~') {
            continue;
        }
        if in_metadata {
            if trimmed == END_OF_METADATA {
                in_metadata = false;
            } else if let Some(rest) = trimmed.strip_prefix('<') {
                if let Some((tag, value)) = rest.split_once('>') {
                    sections.metadata.push((format!("<{tag}>"), value.trim().to_string()));
                }
            }
            continue;
        }
        sections.lines.push((number, trimmed.to_string()));
    }
    Ok(sections)
}

/// Reads links of a network file.
pub fn read_network<R: BufRead>(reader: R) -> Result<NetworkData, NetworkError> {
    let sections = split_sections(reader)?;
    let mut links = Vec::new();
    for (line, text) in &sections.lines {
        let fields: Vec<&str> = text
            .trim_end_matches(';')
            .split_whitespace()
            .filter(|field| *field != ";")
            .collect();
        if fields.len() < 10 {
            return Err(parse_error(*line, format!("expected 10 link fields, got {}", fields.len())));
        }
        let mut values = [0.; 8];
        for (value, field) in values.iter_mut().zip(&fields[2..10]) {
            *value = parse_number(field, *line, "link field")?;
        }
        links.push(LinkRecord {
            init_node: parse_number(fields[0], *line, "node")?,
            term_node: parse_number(fields[1], *line, "node")?,
            capacity: values[0],
            length: values[1],
            free_flow_time: values[2],
            b: values[3],
            power: values[4],
            speed_limit: values[5],
            toll: values[6],
            link_type: values[7],
        });
    }
    let max_node = links
        .iter()
        .map(|link| link.init_node.max(link.term_node))
        .max()
        .unwrap_or(0);
    let node_count = sections.metadata_count("<NUMBER OF NODES>")?.unwrap_or(max_node);
    Ok(NetworkData {
        node_count,
        zone_count: sections.metadata_count("<NUMBER OF ZONES>")?,
        links,
    })
}

/// Reads a network file from disk.
pub fn read_network_file(path: impl AsRef<Path>) -> Result<NetworkData, NetworkError> {
    read_network(open(path.as_ref())?)
}

/// Reads a trips file into a demand matrix with `node_count` rows.
pub fn read_trips<R: BufRead>(reader: R, node_count: usize) -> Result<DemandMatrix, NetworkError> {
    let sections = split_sections(reader)?;
    let mut demand = DemandMatrix::new(node_count);
    let mut origin = None;
    for (line, text) in &sections.lines {
        if let Some(rest) = text.strip_prefix("Origin") {
            let number: usize = parse_number(rest, *line, "origin")?;
            origin = Some(to_index(number, node_count, *line)?);
            continue;
        }
        let origin = origin.ok_or_else(|| parse_error(*line, "demand entry before the first origin"))?;
        for entry in text.split(';').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (destination, value) = entry
                .split_once(':')
                .ok_or_else(|| parse_error(*line, format!("expected 'destination : demand', got '{entry}'")))?;
            let destination = to_index(parse_number(destination, *line, "destination")?, node_count, *line)?;
            let value: f64 = parse_number(value, *line, "demand")?;
            demand.set(origin, destination, value)?;
        }
    }
    Ok(demand)
}

/// Reads a trips file from disk.
pub fn read_trips_file(path: impl AsRef<Path>, node_count: usize) -> Result<DemandMatrix, NetworkError> {
    read_trips(open(path.as_ref())?, node_count)
}

/// Reads a reference solution.
pub fn read_solution<R: BufRead>(reader: R) -> Result<KnownSolution, NetworkError> {
    let sections = split_sections(reader)?;
    let mut flows = Vec::new();
    for (line, text) in &sections.lines {
        let fields: Vec<&str> = text
            .split(|c: char| c.is_whitespace() || c == ';')
            .filter(|field| !field.is_empty())
            .collect();
        if fields.first().map_or(true, |field| field.parse::<usize>().is_err()) {
            // header row
            continue;
        }
        if fields.len() < 3 {
            return Err(parse_error(*line, "expected 'from to volume [cost]'"));
        }
        flows.push(LinkFlow {
            init_node: parse_number(fields[0], *line, "node")?,
            term_node: parse_number(fields[1], *line, "node")?,
            flow: parse_number(fields[2], *line, "volume")?,
            cost: fields.get(3).map(|field| parse_number(field, *line, "cost")).transpose()?.unwrap_or(0.),
        });
    }
    Ok(flows.into_iter().collect())
}

/// Reads a reference solution from disk.
pub fn read_solution_file(path: impl AsRef<Path>) -> Result<KnownSolution, NetworkError> {
    read_solution(open(path.as_ref())?)
}

fn to_index(number: usize, node_count: usize, line: usize) -> Result<usize, NetworkError> {
    if number == 0 || number > node_count {
        Err(parse_error(line, format!("node {number} is out of range 1..={node_count}")))
    } else {
        Ok(number - 1)
    }
}
