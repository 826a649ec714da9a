//! Декодер датаграмм navdata: 16-байтный заголовок и опции
//! `id: u16, size: u16, payload` (все поля little-endian).

use byteorder::{ByteOrder, LittleEndian};
use dronelink_types::{
    DemoData, DroneState, NavdataError, NavdataOption, NavdataRecord, NavdataResult,
    NAVDATA_MAGIC,
};
use log::trace;

/// Размер фиксированного заголовка.
pub const NAVDATA_HEADER_SIZE: usize = 16;

/// Размер заголовка опции (id + size).
pub const OPTION_HEADER_SIZE: usize = 4;

pub const DEMO_OPTION_ID: u16 = 0;
pub const CHECKSUM_OPTION_ID: u16 = 0xFFFF;

/// Байт полезной нагрузки demo, которые разбираются.
pub const DEMO_PAYLOAD_SIZE: usize = 40;

/// Декодирует датаграмму navdata.
///
/// Усечённая последняя опция не ошибка: разбор останавливается и запись
/// возвращается с `truncated = true`.
pub fn decode_navdata(data: &[u8]) -> NavdataResult<NavdataRecord> {
    if data.len() < NAVDATA_HEADER_SIZE {
        return Err(NavdataError::TooShort {
            found: data.len(),
            expected: NAVDATA_HEADER_SIZE,
        });
    }

    let magic = LittleEndian::read_u32(&data[0..4]);
    if magic != NAVDATA_MAGIC {
        return Err(NavdataError::InvalidMagic(magic));
    }

    let mut record = NavdataRecord::new(
        DroneState::new(LittleEndian::read_u32(&data[4..8])),
        LittleEndian::read_u32(&data[8..12]),
        LittleEndian::read_u32(&data[12..16]),
    );

    let mut off = NAVDATA_HEADER_SIZE;

    while off < data.len() {
        if data.len() - off < OPTION_HEADER_SIZE {
            record.truncated = true;
            break;
        }

        let id = LittleEndian::read_u16(&data[off..off + 2]);
        let size = usize::from(LittleEndian::read_u16(&data[off + 2..off + 4]));

        if size < OPTION_HEADER_SIZE || off + size > data.len() {
            trace!("Navdata option {id:#06x} truncated at offset {off} (size {size})");
            record.truncated = true;
            break;
        }

        let payload = &data[off + OPTION_HEADER_SIZE..off + size];

        let option = match id {
            DEMO_OPTION_ID if payload.len() >= DEMO_PAYLOAD_SIZE => {
                NavdataOption::Demo(decode_demo(payload))
            }
            CHECKSUM_OPTION_ID if payload.len() >= 4 => {
                let expected = LittleEndian::read_u32(payload);
                record.checksum_valid = Some(navdata_checksum(&data[..off]) == expected);

                NavdataOption::Checksum(expected)
            }
            _ => NavdataOption::Opaque(payload.to_vec()),
        };

        record.options.insert(id, option);
        off += size;
    }

    Ok(record)
}

/// Сумма байт по модулю 2^32.
pub fn navdata_checksum(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |acc, b| acc.wrapping_add(u32::from(*b)))
}

/// Тысячные доли градуса -> целые градусы с отбрасыванием дробной части.
pub fn millidegrees_to_degrees(value: f32) -> i32 {
    (value / 1000.0) as i32
}

fn decode_demo(p: &[u8]) -> DemoData {
    DemoData {
        ctrl_state: LittleEndian::read_u32(&p[0..4]),
        battery: LittleEndian::read_u32(&p[4..8]),
        theta: millidegrees_to_degrees(LittleEndian::read_f32(&p[8..12])),
        phi: millidegrees_to_degrees(LittleEndian::read_f32(&p[12..16])),
        psi: millidegrees_to_degrees(LittleEndian::read_f32(&p[16..20])),
        altitude: LittleEndian::read_i32(&p[20..24]),
        vx: LittleEndian::read_f32(&p[24..28]),
        vy: LittleEndian::read_f32(&p[28..32]),
        vz: LittleEndian::read_f32(&p[32..36]),
        num_frames: LittleEndian::read_u32(&p[36..40]),
    }
}
