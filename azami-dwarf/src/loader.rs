//! ELFからのDWARFセクション読み込み

use std::fs;
use std::path::Path;
use std::rc::Rc;

use object::{Object, ObjectSection};
use tracing::{debug, warn};

use crate::info::{Info, Sections};
use crate::Result;

/// DWARFローダー
///
/// 実行ファイルからデバッグセクション一式を取り出して情報カタログを
/// 構築します。`.gnu_debugaltlink`があればalternateデバッグファイル
/// （DWZで共通部分を括り出したファイル）も読み込んで接続します。
pub struct DwarfLoader {
    info: Rc<Info>,
}

impl DwarfLoader {
    /// ELFファイルからDWARF情報を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file_data = fs::read(path)?;
        let object_file = object::File::parse(&*file_data)?;

        let sections = Sections {
            debug_info: section_data(&object_file, ".debug_info"),
            debug_abbrev: section_data(&object_file, ".debug_abbrev"),
            debug_str: section_data(&object_file, ".debug_str"),
            debug_line_str: section_data(&object_file, ".debug_line_str"),
            debug_str_offsets: section_data(&object_file, ".debug_str_offsets"),
            debug_addr: section_data(&object_file, ".debug_addr"),
            debug_ranges: section_data(&object_file, ".debug_ranges"),
            debug_rnglists: section_data(&object_file, ".debug_rnglists"),
        };
        let info = Info::new(sections);
        debug!("loaded DWARF sections from {:?}", path);

        // alternateファイルのパスは本体ファイルのディレクトリ相対
        if let Some(alt_name) = debugaltlink_name(&object_file) {
            let alt_path = path.parent().unwrap_or(Path::new(".")).join(&alt_name);
            match Self::load(&alt_path) {
                Ok(alt) => {
                    debug!("loaded alternate debug file {:?}", alt_path);
                    info.set_alt(alt.info);
                }
                Err(err) => {
                    // alternate無しでも本体の解析は続けられる
                    warn!("failed to load alternate debug file {:?}: {}", alt_path, err);
                }
            }
        }

        Ok(Self { info })
    }

    /// 情報カタログへの参照を取得
    pub fn info(&self) -> &Rc<Info> {
        &self.info
    }
}

/// 指定名のセクションの中身をコピーして返す（無ければ空）
fn section_data(file: &object::File<'_>, name: &str) -> Vec<u8> {
    file.section_by_name(name)
        .and_then(|section| section.data().ok())
        .map(|data| data.to_vec())
        .unwrap_or_default()
}

/// .gnu_debugaltlinkからalternateファイル名を取り出す
///
/// セクションの中身はNUL終端のファイル名とbuild-idの連結。
fn debugaltlink_name(file: &object::File<'_>) -> Option<String> {
    let section = file.section_by_name(".gnu_debugaltlink")?;
    let data = section.data().ok()?;
    let end = data.iter().position(|&b| b == 0)?;
    Some(String::from_utf8_lossy(&data[..end]).into_owned())
}
