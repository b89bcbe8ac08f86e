//! End-to-end scenario: parse a real GenICam XML document with
//! `genapi-xml`, build a `NodeMap` from it, and read/write features
//! against a fake register transport — the path a real camera driver
//! follows from `FirstURL` bytes down to a typed feature value.

use std::cell::RefCell;
use std::collections::HashMap;

use genapi_core::{GenApiError, NodeMap, RegisterIo};

const FIXTURE: &str = r#"
    <RegisterDescription SchemaMajorVersion="1" SchemaMinorVersion="2" SchemaSubMinorVersion="3">
        <Integer Name="Width">
            <Address>0x0000_0100</Address>
            <Length>4</Length>
            <AccessMode>RW</AccessMode>
            <Min>16</Min>
            <Max>4096</Max>
            <Inc>2</Inc>
        </Integer>
        <Float Name="ExposureTime">
            <Address>0x0000_0200</Address>
            <Length>4</Length>
            <AccessMode>RW</AccessMode>
            <Min>10.0</Min>
            <Max>200000.0</Max>
        </Float>
        <Enumeration Name="PixelFormat">
            <Address>0x0000_0300</Address>
            <Length>4</Length>
            <AccessMode>RW</AccessMode>
            <EnumEntry Name="Mono8" Value="0" />
            <EnumEntry Name="Mono16" Value="1" />
        </Enumeration>
        <Boolean Name="AcquisitionFrameRateEnable">
            <Address>0x0000_0400</Address>
            <Length>1</Length>
            <AccessMode>RW</AccessMode>
        </Boolean>
        <Command Name="AcquisitionStart">
            <Address>0x0000_0500</Address>
            <Length>4</Length>
        </Command>
    </RegisterDescription>
"#;

struct FakeRegisters {
    bytes: RefCell<HashMap<u64, Vec<u8>>>,
}

impl FakeRegisters {
    fn new() -> Self {
        Self {
            bytes: RefCell::new(HashMap::new()),
        }
    }
}

impl RegisterIo for FakeRegisters {
    fn read(&self, addr: u64, len: usize) -> Result<Vec<u8>, GenApiError> {
        Ok(self
            .bytes
            .borrow()
            .get(&addr)
            .cloned()
            .unwrap_or_else(|| vec![0; len]))
    }

    fn write(&self, addr: u64, data: &[u8]) -> Result<(), GenApiError> {
        self.bytes.borrow_mut().insert(addr, data.to_vec());
        Ok(())
    }
}

#[test]
fn reads_and_writes_features_declared_in_real_xml() {
    let model = genapi_xml::parse(FIXTURE).expect("parse fixture xml");
    assert_eq!(model.version, "1.2.3");

    let map = NodeMap::from_xml_model(&model).expect("build node map");
    let io = FakeRegisters::new();

    map.set_integer("Width", 1920, &io).expect("set width");
    assert_eq!(map.get_integer("Width", &io).expect("get width"), 1920);

    map.set_float("ExposureTime", 5000.0, &io).expect("set exposure");
    assert_eq!(
        map.get_float("ExposureTime", &io).expect("get exposure"),
        5000.0
    );

    map.set_enum("PixelFormat", "Mono16", &io).expect("set pixel format");
    assert_eq!(
        map.get_enum("PixelFormat", &io).expect("get pixel format"),
        "Mono16"
    );

    map.set_bool("AcquisitionFrameRateEnable", true, &io)
        .expect("set bool");
    assert!(map
        .get_bool("AcquisitionFrameRateEnable", &io)
        .expect("get bool"));

    map.exec_command("AcquisitionStart", &io)
        .expect("execute command");
}

#[test]
fn rejects_integer_value_outside_declared_range() {
    let model = genapi_xml::parse(FIXTURE).expect("parse fixture xml");
    let map = NodeMap::from_xml_model(&model).expect("build node map");
    let io = FakeRegisters::new();

    let err = map.set_integer("Width", 1, &io).unwrap_err();
    assert!(matches!(err, GenApiError::OutOfRange(_)));
}
