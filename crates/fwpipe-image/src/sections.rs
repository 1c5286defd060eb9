//! Extraction of ELF sections destined for section TLVs.

use std::fs;
use std::path::Path;

use elf::endian::AnyEndian;
use elf::ElfBytes;

use crate::error::{ImageError, ImageResult};
use crate::tlv::Tlv;

/// Split a comma-delimited section list, dropping blanks.
pub fn parse_section_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read each named section from the ELF file and wrap it in a SECTION TLV.
pub fn read_section_tlvs(elf_path: &Path, names: &[String]) -> ImageResult<Vec<Tlv>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let data = fs::read(elf_path).map_err(|e| ImageError::Read {
        path: elf_path.to_path_buf(),
        source: e,
    })?;
    let elf_err = |reason: String| ImageError::Elf {
        path: elf_path.to_path_buf(),
        reason,
    };

    let file = ElfBytes::<AnyEndian>::minimal_parse(&data).map_err(|e| elf_err(e.to_string()))?;

    let mut tlvs = Vec::with_capacity(names.len());
    for name in names {
        let shdr = file
            .section_header_by_name(name)
            .map_err(|e| elf_err(e.to_string()))?
            .ok_or_else(|| ImageError::SectionNotFound(name.clone()))?;
        let (contents, _) = file.section_data(&shdr).map_err(|e| elf_err(e.to_string()))?;
        tlvs.push(Tlv::section(name, contents));
    }
    Ok(tlvs)
}
