use postro_codec::{
    Parser, Result, Serializer,
    postgres::{BindConfig, ExecOptions, Param, ParseQuery, PortalTarget, frontend},
};

/// Backend response to the extended query below, as a server would send it.
const RESPONSE: &[u8] = b"1\0\0\0\x04\
    2\0\0\0\x04\
    T\0\0\0\x1b\0\x01id\0\0\0\0\0\0\0\0\0\0\x17\0\x04\xff\xff\xff\xff\0\0\
    D\0\0\0\x0c\0\x01\0\0\0\x0242\
    C\0\0\0\x0dSELECT 1\0\
    Z\0\0\0\x05I";

pub fn main() -> Result<()> {
    let mut ser = Serializer::new();
    let params = [Param::from(42i32)];

    let frames = [
        ser.parse(ParseQuery { name: "", text: "SELECT $1::int4 AS id", types: &[] }),
        ser.bind(BindConfig { values: &params, ..Default::default() }),
        ser.describe(PortalTarget::portal("")),
        ser.execute(ExecOptions::default()),
        frontend::sync(),
    ];

    for frame in &frames {
        tracing::info!(msgtype = %char::from(frame[0]), len = frame.len(), "frontend");
    }

    // deliver the response in small pieces, as a socket might
    let mut parser = Parser::new();
    for chunk in RESPONSE.chunks(7) {
        parser.parse(chunk, |message| {
            tracing::info!(name = message.name(), "backend {message:?}");
        })?;
    }

    Ok(())
}
