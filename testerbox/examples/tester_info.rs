use std::net::SocketAddr;
use testerbox::Tester;

fn main() -> anyhow::Result<()> {
    // Connect
    let host_addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "192.168.0.10:5000".to_owned())
        .parse()?;
    let mut tester = Tester::connect(host_addr)?;
    println!("{}", tester.read_info()?);
    // Walk a single bit across the outputs and read back what the tester box sees
    for i in 0..8 {
        tester.write_outputs(1 << i)?;
        println!("{:08b}", tester.read_inputs()?);
    }
    Ok(())
}
