use super::ImageExportDirectory;
use crate::error::{Result, checked_add};
use crate::reader::Reader;

/// Linear search of the export name table. Returns the RVA of the function.
pub(super) fn find_export(
    rva: &Reader,
    directory: &ImageExportDirectory,
    name: &str,
) -> Result<Option<u64>> {
    for index in 0..directory.number_of_names as u64 {
        let name_rva = rva.read_u32(checked_add(directory.address_of_names as u64, 4 * index)?)?;
        if name_rva == 0 || rva.read_string(name_rva as u64)? != name {
            continue;
        }

        let ordinal = rva.read_u16(checked_add(
            directory.address_of_name_ordinals as u64,
            2 * index,
        )?)?;
        let function = rva.read_u32(checked_add(
            directory.address_of_functions as u64,
            4 * ordinal as u64,
        )?)?;
        return Ok(Some(function as u64));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use crate::pe::{DIRECTORY_EXPORT, PeFile};
    use crate::test_data::PeBuilder;
    use std::sync::Arc;

    const EDATA: u32 = 0x4000;

    // Names are sorted as the loader expects, ordinals are deliberately not in name order.
    fn image() -> PeFile {
        let names = ["CLRJitAttachState", "DllMain", "MetaDataGetDispenser"];
        let functions = [0x1100u32, 0x1200, 0x1300];
        let ordinals = [2u16, 0, 1];

        let mut section = vec![0u8; 0x40];
        let functions_rva = EDATA + section.len() as u32;
        for f in functions {
            section.extend(f.to_le_bytes());
        }
        let names_rva = EDATA + section.len() as u32;
        let strings_rva = names_rva + 4 * names.len() as u32 + 2 * ordinals.len() as u32;
        let mut strings = Vec::new();
        for name in names {
            section.extend((strings_rva + strings.len() as u32).to_le_bytes());
            strings.extend(name.as_bytes());
            strings.push(0);
        }
        let ordinals_rva = EDATA + section.len() as u32;
        for o in ordinals {
            section.extend(o.to_le_bytes());
        }
        section.extend(strings);

        let mut header = Vec::new();
        header.extend([0u8; 12]);
        header.extend(0u32.to_le_bytes()); // name
        header.extend(1u32.to_le_bytes()); // base
        header.extend((functions.len() as u32).to_le_bytes());
        header.extend((names.len() as u32).to_le_bytes());
        header.extend(functions_rva.to_le_bytes());
        header.extend(names_rva.to_le_bytes());
        header.extend(ordinals_rva.to_le_bytes());
        section[..header.len()].copy_from_slice(&header);

        let size = section.len() as u32;
        let bytes = PeBuilder::new(false)
            .section(".edata", EDATA, section)
            .directory(DIRECTORY_EXPORT, EDATA, size)
            .build();
        PeFile::new(Arc::new(bytes), false)
    }

    #[test]
    fn lookups() {
        let file = image();
        let directory = file.export_directory().unwrap().unwrap();
        assert_eq!(directory.number_of_names, 3);
        assert_eq!(directory.base, 1);

        assert_eq!(file.export_symbol("CLRJitAttachState").unwrap(), Some(0x1300));
        assert_eq!(file.export_symbol("DllMain").unwrap(), Some(0x1100));
        assert_eq!(file.export_symbol("MetaDataGetDispenser").unwrap(), Some(0x1200));
        assert_eq!(file.export_symbol("dllmain").unwrap(), None);
    }

    #[test]
    fn export_table_outside_sections() {
        let bytes = PeBuilder::new(false)
            .section(".text", 0x1000, vec![0; 0x10])
            .directory(DIRECTORY_EXPORT, 0x9000, 0x28)
            .build();
        let file = PeFile::new(Arc::new(bytes), false);
        assert!(file.export_directory().unwrap().is_none());
        assert_eq!(file.export_symbol("DllMain").unwrap(), None);
    }
}
