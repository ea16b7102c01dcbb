//! コンパイルユニット
//!
//! .debug_infoセクション内の1ユニット。ヘッダをパースしてバージョン・
//! アドレス幅・オフセット幅を確定し、略語テーブルとDIEキャッシュ、
//! レンジリストキャッシュを所有します。

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::abbrev::{AbbrevTable, Abbreviation};
use crate::die::{Die, RawDie};
use crate::encodings::DwUt;
use crate::errors::DwarfError;
use crate::info::Info;
use crate::ranges::Ranges;
use crate::reader::DwarfReader;
use crate::Result;

/// コンパイルユニット
///
/// バージョン・アドレス幅・オフセット幅の権威であり、ユニット内の
/// Raw DIEは`(ユニット, オフセット)`ごとに高々1つにインターンされます。
#[derive(Debug)]
pub struct Unit {
    /// .debug_info内でのこのユニットのバイトオフセット
    pub offset: u64,
    /// このユニットの終端オフセット
    pub end: u64,
    /// DWARFバージョン（2..=5）
    pub version: u16,
    /// ターゲットのアドレス幅（4または8）
    pub address_size: u8,
    /// セクションオフセットの幅（DWARF32=4, DWARF64=8）
    pub offset_size: u8,
    /// ユニット種別（DWARF 5ヘッダのみ。それ以前は0）
    pub unit_type: DwUt,
    first_die: u64,
    abbrev: AbbrevTable,
    die_cache: RefCell<HashMap<u64, Rc<RawDie>>>,
    range_cache: RefCell<HashMap<u64, Rc<Ranges>>>,
}

impl Unit {
    /// .debug_infoの指定オフセットにあるユニットヘッダをパースする
    pub(crate) fn parse(info_data: &[u8], abbrev_data: &[u8], offset: u64) -> Result<Unit> {
        let mut r = DwarfReader::new(info_data, offset as usize);

        // initial length: 0xffffffffはDWARF64のエスケープ
        let initial = r.read_u32()?;
        let (offset_size, length) = if initial == 0xffff_ffff {
            (8u8, r.read_uint(8)?)
        } else {
            (4u8, initial as u64)
        };
        let end = r.offset() as u64 + length;

        let version = r.read_u16()?;
        if !(2..=5).contains(&version) {
            return Err(DwarfError::UnsupportedVersion { version });
        }

        // ヘッダレイアウトはv5でunit_typeが挟まり順序も変わった
        let (unit_type, address_size, abbrev_offset) = if version >= 5 {
            let unit_type = DwUt(r.read_u8()?);
            let address_size = r.read_u8()?;
            let abbrev_offset = r.read_uint(offset_size as usize)?;
            (unit_type, address_size, abbrev_offset)
        } else {
            let abbrev_offset = r.read_uint(offset_size as usize)?;
            let address_size = r.read_u8()?;
            (DwUt(0), address_size, abbrev_offset)
        };

        let first_die = r.offset() as u64;
        let abbrev = AbbrevTable::parse(abbrev_data, abbrev_offset)?;

        Ok(Unit {
            offset,
            end,
            version,
            address_size,
            offset_size,
            unit_type,
            first_die,
            abbrev,
            die_cache: RefCell::new(HashMap::new()),
            range_cache: RefCell::new(HashMap::new()),
        })
    }

    /// ルートDIE（ヘッダ直後）のオフセット
    pub fn first_die_offset(&self) -> u64 {
        self.first_die
    }

    /// オフセットがこのユニットのDIE領域内か
    pub fn contains_offset(&self, offset: u64) -> bool {
        self.first_die <= offset && offset < self.end
    }

    /// 略語コードから略語を引く
    pub fn find_abbreviation(&self, code: u64) -> Result<Rc<Abbreviation>> {
        self.abbrev.find(code)
    }

    /// オフセットのDIEを返す。キャッシュがあればそれを、なければ
    /// デコードしてインターンする
    ///
    /// `parent`はデコード時に親として記録されるDIE。ユニット中腹への
    /// 直接参照では`None`を渡す（親は後でツリー走査が確定する）。
    /// オフセットが略語コード0（兄弟チェーン終端）を指していた場合は
    /// `parent`の次兄弟オフセットを確定して`None`を返す。
    pub fn offset_to_die(
        self: &Rc<Self>,
        info: &Rc<Info>,
        parent: Option<&Die>,
        offset: u64,
    ) -> Result<Option<Die>> {
        if offset == 0 || offset >= self.end {
            return Ok(None);
        }
        if let Some(raw) = self.die_cache.borrow().get(&offset) {
            return Ok(Some(Die::from_parts(
                info.clone(),
                self.clone(),
                offset,
                raw.clone(),
            )));
        }

        let mut r = DwarfReader::new(&info.sections().debug_info, offset as usize);
        let code = r.read_uleb128()?;
        if code == 0 {
            // 終端に到達した。親の次兄弟はこの直後から始まる
            if let Some(parent) = parent {
                parent.raw().set_next_sibling_once(r.offset() as u64);
            }
            return Ok(None);
        }

        let abbrev = self.abbrev.find(code)?;
        let parent_offset = parent.map_or(0, |p| p.offset());
        let raw = Rc::new(RawDie::decode(&mut r, abbrev, self, parent_offset)?);
        self.die_cache.borrow_mut().insert(offset, raw.clone());
        Ok(Some(Die::from_parts(info.clone(), self.clone(), offset, raw)))
    }

    /// ルートDIEを返す
    pub fn root(self: &Rc<Self>, info: &Rc<Info>) -> Result<Die> {
        self.offset_to_die(info, None, self.first_die)?
            .ok_or(DwarfError::InvariantViolated("unit has no root DIE"))
    }

    /// このDIEがユニットのルートか
    pub fn is_root(&self, die: &Die) -> bool {
        die.offset() == self.first_die
    }

    /// レンジリストキャッシュを引く
    pub(crate) fn cached_ranges(&self, key: u64) -> Option<Rc<Ranges>> {
        self.range_cache.borrow().get(&key).cloned()
    }

    /// デコード済みレンジリストをキャッシュする（先着が勝つ）
    pub(crate) fn cache_ranges(&self, key: u64, ranges: Ranges) -> Rc<Ranges> {
        self.range_cache
            .borrow_mut()
            .entry(key)
            .or_insert_with(|| Rc::new(ranges))
            .clone()
    }

    /// 値デコーダのテスト用に、ヘッダなしでユニットコンテキストを作る
    #[cfg(test)]
    pub(crate) fn for_tests(version: u16, address_size: u8, offset_size: u8) -> Unit {
        Unit {
            offset: 0,
            end: u64::MAX,
            version,
            address_size,
            offset_size,
            unit_type: DwUt(0),
            first_die: 0,
            abbrev: AbbrevTable::default(),
            die_cache: RefCell::new(HashMap::new()),
            range_cache: RefCell::new(HashMap::new()),
        }
    }
}
