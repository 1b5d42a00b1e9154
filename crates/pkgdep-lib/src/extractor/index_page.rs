use regex::{Captures, Regex};

use super::{page_text, DownloadMetadata, ExtractError, PageExtractor};

/// Row header of the download metadata table holding the artifact digest.
pub const SHA256_LABEL: &str = "SHA256 checksum";

/// [`PageExtractor`] for the package index's HTML layout.
///
/// - Dependencies are the link texts inside `<ul class="uldep">` lists.
/// - The digest is the cell next to the [`SHA256_LABEL`] header in `<table id="pdownloadmeta">`.
/// - Links are every anchor `href` on the download page.
#[derive(Debug, Clone)]
pub struct IndexPageExtractor {
	dependency_list: Regex,
	anchor_text: Regex,
	metadata_table: Regex,
	row: Regex,
	header: Regex,
	cell: Regex,
	href: Regex,
	tag: Regex,
	entity: Regex,
}

impl Default for IndexPageExtractor {
	fn default() -> Self {
		Self::new()
	}
}

impl IndexPageExtractor {
	pub fn new() -> Self {
		let re = |pattern: &str| Regex::new(pattern).expect("built-in extractor pattern should compile");
		Self {
			dependency_list: re(r#"(?is)<ul\b[^>]*\bclass\s*=\s*["'][^"']*\buldep\b[^"']*["'][^>]*>(.*?)</ul>"#),
			anchor_text: re(r"(?is)<a\b[^>]*>(.*?)</a>"),
			metadata_table: re(r#"(?is)<table\b[^>]*\bid\s*=\s*["']pdownloadmeta["'][^>]*>(.*?)</table>"#),
			row: re(r"(?is)<tr\b[^>]*>(.*?)</tr>"),
			header: re(r"(?is)<th\b[^>]*>(.*?)</th>"),
			cell: re(r"(?is)<td\b[^>]*>(.*?)</td>"),
			href: re(r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#),
			tag: re(r"(?s)<[^>]*>"),
			entity: re(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);"),
		}
	}

	/// Visible text of an HTML fragment with whitespace collapsed.
	fn text(&self, html: &str) -> String {
		let stripped = self.tag.replace_all(html, " ");
		let decoded = self.decode_entities(&stripped);
		decoded.split_whitespace().collect::<Vec<_>>().join(" ")
	}

	fn decode_entities(&self, s: &str) -> String {
		self.entity
			.replace_all(s, |caps: &Captures| {
				let entity = &caps[1];
				let decoded = match entity {
					"amp" => Some('&'),
					"lt" => Some('<'),
					"gt" => Some('>'),
					"quot" => Some('"'),
					"apos" => Some('\''),
					"nbsp" => Some(' '),
					_ if entity.starts_with("#x") || entity.starts_with("#X") => {
						u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
					},
					_ if entity.starts_with('#') => entity[1..].parse::<u32>().ok().and_then(char::from_u32),
					_ => None,
				};
				decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
			})
			.into_owned()
	}

	fn expected_hash(&self, page: &str) -> Result<Option<String>, ExtractError> {
		let Some(table) = self.metadata_table.captures(page) else {
			log::debug!("Download page has no metadata table.");
			return Ok(None);
		};

		for row in self.row.captures_iter(&table[1]) {
			let row = &row[1];
			let Some(header) = self.header.captures(row) else {
				continue;
			};
			if self.text(&header[1]) != SHA256_LABEL {
				continue;
			}

			let cell = self
				.cell
				.captures(row)
				.ok_or_else(|| ExtractError::Malformed(format!("\"{}\" row has no value", SHA256_LABEL)))?;
			let hash = self.text(&cell[1]);
			return Ok(if hash.is_empty() { None } else { Some(hash) });
		}

		Ok(None)
	}
}

impl PageExtractor for IndexPageExtractor {
	fn dependency_names(&self, page: &[u8]) -> Result<Vec<String>, ExtractError> {
		let page = page_text(page)?;
		let names = self
			.dependency_list
			.captures_iter(page)
			.flat_map(|list| {
				self.anchor_text
					.captures_iter(list.get(1).map_or("", |m| m.as_str()))
					.map(|anchor| self.text(&anchor[1]))
					.collect::<Vec<_>>()
			})
			.filter(|name| !name.is_empty())
			.collect();
		Ok(names)
	}

	fn download_metadata(&self, page: &[u8]) -> Result<DownloadMetadata, ExtractError> {
		let page = page_text(page)?;
		let expected_hash = self.expected_hash(page)?;
		let links = self
			.href
			.captures_iter(page)
			.filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
			.map(|m| self.decode_entities(m.as_str().trim()))
			.collect();
		Ok(DownloadMetadata { expected_hash, links })
	}
}
