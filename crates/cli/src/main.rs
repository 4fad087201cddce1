use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use rtp_ingest::error::SdpErrorKind;
use rtp_ingest::{
    AnnexbWriter, FrameSink, IngestError, LogSink, Receiver, ReceiverConfig, RtspClient,
};

#[derive(Parser)]
#[command(
    name = "rtp-ingest",
    about = "Receive an H.264 RTP stream from a network camera"
)]
struct Args {
    /// Camera stream URL (rtsp://host[:port]/path)
    #[arg(long, short)]
    url: String,

    /// Local RTP port; RTCP uses the next one
    #[arg(long, default_value_t = 33056, value_parser = clap::value_parser!(u16).range(1..65535))]
    client_port: u16,

    /// Camera address for punch datagrams and RTCP (defaults to the RTSP peer)
    #[arg(long)]
    server_ip: Option<IpAddr>,

    /// Stream identifier stamped on every frame
    #[arg(long, default_value_t = 0)]
    id: u32,

    /// Write the Annex-B stream to this file instead of logging frames
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Seconds between RTSP keep-alive requests
    #[arg(long, default_value_t = 50)]
    keepalive_secs: u64,

    /// Log at DEBUG level
    #[arg(long, short)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    if let Err(e) = run(args) {
        tracing::error!(error = %e, "ingest failed");
        std::process::exit(1);
    }
}

fn run(args: Args) -> rtp_ingest::Result<()> {
    let control_port = rtcp_port_for(args.client_port)?;

    let mut client = RtspClient::connect(&args.url, Duration::from_secs(10))?;
    client.options()?;
    let session = client.describe()?;

    let format = session
        .h264_formats()
        .next()
        .ok_or(IngestError::Sdp {
            kind: SdpErrorKind::NoH264Media,
        })?;
    let track = format.control.clone().unwrap_or_else(|| args.url.clone());
    let transport = client.setup(&track, (args.client_port, control_port))?;
    let (server_media_port, server_control_port) =
        transport.server_port.unwrap_or((50000, 50001));

    let writer = match &args.output {
        Some(path) => Some(Arc::new(AnnexbWriter::create(path)?)),
        None => None,
    };
    let sink: Arc<dyn FrameSink> = match &writer {
        Some(writer) => writer.clone(),
        None => Arc::new(LogSink),
    };

    let config = ReceiverConfig {
        media_port: args.client_port,
        control_port,
        server_ip: match args.server_ip {
            Some(ip) => ip,
            None => client.server_ip()?,
        },
        server_media_port,
        server_control_port,
        keepalive_interval: Duration::from_secs(args.keepalive_secs),
        sender_id: args.id,
        ..Default::default()
    };

    // Punch before PLAY so the first packets get through.
    let mut receiver = Receiver::new(config, &session, sink)?;
    receiver.start()?;
    let play_uri = session.control.clone().unwrap_or_else(|| args.url.clone());
    client.play(&play_uri)?;

    let handle = receiver.handle();
    thread::spawn(move || {
        println!("Receiving from camera, press Enter to stop");
        let mut input = String::new();
        // EOF on stdin (daemonized) keeps the stream running
        if matches!(io::stdin().read_line(&mut input), Ok(n) if n > 0) {
            handle.stop();
        }
    });

    receiver.run(&mut client)?;

    if let Some(writer) = writer {
        writer.flush()?;
    }
    Ok(())
}

/// RTCP port paired with an RTP port.
fn rtcp_port_for(client_port: u16) -> rtp_ingest::Result<u16> {
    client_port.checked_add(1).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("client port {client_port} leaves no room for RTCP"),
        )
        .into()
    })
}
