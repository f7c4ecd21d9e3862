//! Resource assembly (§4.1, C5 stage 5). CPU count is copied verbatim;
//! memory is parsed through [`super::memory::parse_memory_bytes`].

use super::memory::parse_memory_bytes;
use vessel_shared::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resources {
    pub cpus: Option<u32>,
    pub memory_bytes: Option<u64>,
}

pub fn resolve_resources(cpus: Option<u32>, memory: Option<&str>) -> Result<Resources> {
    let memory_bytes = memory.map(parse_memory_bytes).transpose()?;
    Ok(Resources {
        cpus,
        memory_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_cpu_count() {
        let r = resolve_resources(Some(4), None).unwrap();
        assert_eq!(r.cpus, Some(4));
        assert_eq!(r.memory_bytes, None);
    }

    #[test]
    fn parses_memory_to_bytes() {
        let r = resolve_resources(None, Some("2g")).unwrap();
        assert_eq!(r.memory_bytes, Some(2 * 1024 * 1024 * 1024));
    }

    #[test]
    fn propagates_memory_parse_errors() {
        assert!(resolve_resources(None, Some("bogus")).is_err());
    }
}
